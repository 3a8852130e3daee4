/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

pub mod auth_results;
pub mod crypto;
pub mod headers;
pub mod lru;
pub mod message;
pub mod parse;
pub mod resolver;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_keys;
