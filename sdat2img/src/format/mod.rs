// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

pub mod compression;
pub mod rangeset;
pub mod transfer_list;
