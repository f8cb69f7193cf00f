// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! A macro to define bitflags in a structured way.

/// Declares a `Copy` bitflag set backed by an integer, with named constants,
/// set operations, bitwise operators and an allocation-free `Debug`.
#[macro_export]
#[doc(hidden)]
macro_rules! tessera_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name {
            pub(crate) bits: $ty,
        }

        impl $name {
            /// An empty set of flags.
            pub const EMPTY: Self = Self { bits: 0 };

            /// Creates a new bitflag set from the given raw bits.
            /// Bits not corresponding to any defined flag are kept.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self { bits }
            }

            /// Returns the raw value of the bitflag set.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Returns `true` if no flag is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Returns `true` if all flags in `other` are contained within `self`.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if any flag in `other` is contained within `self`.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Inserts the flags in `other` into `self`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Removes the flags in `other` from `self`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Returns a new `Self` with `other` flags inserted.
            #[must_use]
            pub const fn with(mut self, other: Self) -> Self {
                self.bits |= other.bits;
                self
            }

            /// Returns a new `Self` with `other` flags removed.
            #[must_use]
            pub const fn without(mut self, other: Self) -> Self {
                self.bits &= !other.bits;
                self
            }

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }
        }

        impl core::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self { bits: !self.bits }
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.bits |= other.bits;
            }
        }

        impl core::ops::BitAndAssign for $name {
            fn bitand_assign(&mut self, other: Self) {
                self.bits &= other.bits;
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut bits = self.bits;
                let mut first_flag = true;

                write!(f, "{} {{ ", stringify!($name))?;

                $(
                    // Zero-valued aliases never print; they would match every set.
                    if ($flag_value != 0) && (bits & $flag_value) == $flag_value {
                        if !first_flag {
                            write!(f, " | ")?;
                        }
                        write!(f, "{}", stringify!($flag_name))?;
                        bits &= !$flag_value;
                        first_flag = false;
                    }
                )*

                if bits != 0 {
                    if !first_flag {
                        write!(f, " | ")?;
                    }
                    write!(f, "UNKNOWN({:#x})", bits)?;
                    first_flag = false;
                }

                if self.bits == 0 && first_flag {
                    write!(f, "EMPTY")?;
                }

                write!(f, " }}")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::tessera_bitflags;

    tessera_bitflags! {
        /// Flags used to exercise the macro.
        pub struct BindFlags: u32 {
            const VERTEX = 1 << 0;
            const INDEX = 1 << 1;
            const CONSTANT = 1 << 2;
            const SHADER_RESOURCE = 1 << 3;
            const GEOMETRY = Self::VERTEX.bits() | Self::INDEX.bits();
            const NONE = 0;
        }
    }

    #[test]
    fn empty_set_prints_empty() {
        let flags = BindFlags::EMPTY;
        assert!(flags.is_empty());
        assert!(flags.contains(BindFlags::NONE));
        assert_eq!(BindFlags::default().bits(), 0);
        assert_eq!(format!("{flags:?}"), "BindFlags { EMPTY }");
    }

    #[test]
    fn combined_constants_collapse_in_debug_output() {
        let flags = BindFlags::VERTEX | BindFlags::INDEX;
        assert_eq!(flags, BindFlags::GEOMETRY);
        assert_eq!(format!("{flags:?}"), "BindFlags { VERTEX | INDEX }");
    }

    #[test]
    fn unknown_bits_are_kept_and_reported() {
        let flags = BindFlags::from_bits_truncate(0b1_0001);
        assert!(flags.contains(BindFlags::VERTEX));
        assert_eq!(format!("{flags:?}"), "BindFlags { VERTEX | UNKNOWN(0x10) }");
    }

    #[test]
    fn set_operations() {
        let mut flags = BindFlags::CONSTANT;
        flags.insert(BindFlags::SHADER_RESOURCE);
        assert!(flags.intersects(BindFlags::SHADER_RESOURCE | BindFlags::VERTEX));
        assert!(!flags.intersects(BindFlags::GEOMETRY));

        flags.remove(BindFlags::CONSTANT);
        assert_eq!(flags, BindFlags::SHADER_RESOURCE);

        let widened = flags.with(BindFlags::VERTEX).without(BindFlags::SHADER_RESOURCE);
        assert_eq!(widened, BindFlags::VERTEX);
        assert_eq!(flags, BindFlags::SHADER_RESOURCE, "original is unchanged");

        let masked = (BindFlags::GEOMETRY | BindFlags::CONSTANT) & !BindFlags::INDEX;
        assert_eq!(masked, BindFlags::VERTEX | BindFlags::CONSTANT);
    }
}
