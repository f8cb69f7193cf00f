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


//! Thread-group arithmetic for compute dispatches.

/// The number of groups of `group_size` threads needed to cover `threads`.
///
/// A zero group size is treated as 1.
pub const fn group_count(threads: u32, group_size: u32) -> u32 {
    let group_size = if group_size == 0 { 1 } else { group_size };
    threads.div_ceil(group_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(group_count(0, 64), 0);
        assert_eq!(group_count(1, 64), 1);
        assert_eq!(group_count(64, 64), 1);
        assert_eq!(group_count(65, 64), 2);
        assert_eq!(group_count(1920, 8), 240);
        assert_eq!(group_count(10, 0), 10);
    }
}
