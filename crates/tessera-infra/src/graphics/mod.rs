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


//! Graphics backends and the native driver layer they sit on.
//!
//! - [`native`] declares the driver interfaces.
//! - [`software`] implements both of them on the CPU.
//! - `immediate` and `explicit` implement the core traits over a driver.
//! - [`factory`] probes adapters and opens devices.

pub mod conversions;
#[cfg(feature = "explicit")]
pub mod explicit;
pub mod factory;
#[cfg(feature = "immediate")]
pub mod immediate;
pub mod native;
pub mod software;

use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
