// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! VF side of the ThunderX NIC VF/PF mailbox.
//!
//! A VF cannot program its own queues, MAC address, RSS table or link
//! parameters. Each of these is requested from the PF through a two-word
//! mailbox in BAR0 and must be acknowledged before the VF proceeds. Replies
//! arrive through the mailbox interrupt, which the owner of the device
//! forwards to [`NicVf::handle_mbox_interrupt`].

#![forbid(unsafe_code)]

mod commands;
mod mbox;

#[cfg(test)]
mod tests;

pub use commands::CommandError;
pub use mbox::LinkStatus;
pub use mbox::MboxConfig;
pub use mbox::MboxError;
pub use mbox::MboxUpdate;
pub use mbox::NicVf;
pub use mbox::NicVfInfo;
pub use mbox::classify;
