// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mailbox transport: request/acknowledge with the PF and the receive path.

use anyhow::Context;
use nicvf_defs::MBOX_SIZE;
use nicvf_defs::MboxMessage;
use nicvf_defs::MboxMsgKind;
use nicvf_defs::NICVF_MAC_ADDR_SIZE;
use nicvf_defs::NIC_PF_VF_MAILBOX_SIZE;
use nicvf_defs::NIC_TNS_MODE_MASK;
use nicvf_defs::NIC_VF_ID_MASK;
use nicvf_defs::NIC_VF_PF_MAILBOX_0_1;
use nicvf_defs::NicCfgMsg;
use parking_lot::Condvar;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::atomic::fence;
use std::time::Duration;
use std::time::Instant;
use thiserror::Error;
use user_driver::DeviceBacking;
use user_driver::DeviceRegisterIo;
use zerocopy::FromZeros;

const MBOX_MSG_RETRIES: u32 = 5;
// 2000 units polled in steps of 10, sleeping 1ms per step.
const MBOX_MSG_TIMEOUT: Duration = Duration::from_millis(200);
const MBOX_PF_RESPONSE_DELAY: Duration = Duration::from_millis(1);

/// Timing of mailbox requests.
#[derive(Debug, Clone)]
pub struct MboxConfig {
    /// Number of times a request is sent before giving up. At least one
    /// attempt is always made.
    pub retries: u32,
    /// How long each attempt waits for an ACK or NACK.
    pub timeout: Duration,
    /// How long an unacknowledged send holds the mailbox after transmitting.
    pub response_delay: Duration,
}

impl Default for MboxConfig {
    fn default() -> Self {
        Self {
            retries: MBOX_MSG_RETRIES,
            timeout: MBOX_MSG_TIMEOUT,
            response_delay: MBOX_PF_RESPONSE_DELAY,
        }
    }
}

impl MboxConfig {
    /// Sets the number of attempts per request.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the delay after an unacknowledged send.
    pub fn with_response_delay(mut self, response_delay: Duration) -> Self {
        self.response_delay = response_delay;
        self
    }
}

/// A failed mailbox request.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum MboxError {
    /// The PF answered with a NACK.
    #[error("PF rejected {kind}")]
    Rejected {
        /// The rejected request.
        kind: MboxMsgKind,
    },
    /// The PF answered none of the attempts.
    #[error("PF did not respond to {kind} after {attempts} attempts")]
    Busy {
        /// The unanswered request.
        kind: MboxMsgKind,
        /// Attempts made.
        attempts: u32,
    },
}

/// Link state reported by the PF.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// Whether the link is up.
    pub link_up: bool,
    /// Duplex mode as reported by the BGX.
    pub duplex: u8,
    /// Link speed in Mbps.
    pub speed: u32,
}

/// VF identity and configuration learned from the PF.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NicVfInfo {
    /// VF number assigned by the PF.
    pub vf_id: u8,
    /// TNS (tenancy) mode.
    pub tns_mode: u8,
    /// NUMA node of the NIC.
    pub node: u8,
    /// Whether this VF serves secondary queue sets.
    pub sqs_mode: bool,
    /// Whether the PF supports internal loopback for this VF.
    pub loopback_supported: bool,
    /// MAC address assigned by the PF.
    pub mac_addr: [u8; NICVF_MAC_ADDR_SIZE],
    /// RSS indirection table size.
    pub rss_size: u16,
    /// Last reported link state.
    pub link: LinkStatus,
}

/// The state change described by an inbound message.
///
/// Produced by [`classify`] and applied atomically by the receive path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MboxUpdate {
    /// READY reply. Sets the identity fields and completes the request.
    Ready {
        /// VF id, masked to its valid bits.
        vf_id: u8,
        /// TNS mode, masked to its valid bits.
        tns_mode: u8,
        /// NUMA node.
        node: u8,
        /// Secondary queue set mode.
        sqs_mode: bool,
        /// Loopback capability.
        loopback_supported: bool,
        /// Assigned MAC address.
        mac_addr: [u8; NICVF_MAC_ADDR_SIZE],
    },
    /// Completes the request.
    Ack,
    /// Rejects the request.
    Nack,
    /// Sets the RSS table size and completes the request.
    RssSize(u16),
    /// Sets the link state and completes the request.
    LinkChange(LinkStatus),
    /// A kind the PF must not send. Nothing changes.
    Unexpected(MboxMsgKind),
}

/// Maps an inbound message to the state change it requests.
pub fn classify(msg: &MboxMessage) -> MboxUpdate {
    match msg {
        MboxMessage::Ready(cfg) => MboxUpdate::Ready {
            vf_id: cfg.vf_id & NIC_VF_ID_MASK,
            tns_mode: cfg.tns_mode & NIC_TNS_MODE_MASK,
            node: cfg.node_id,
            sqs_mode: cfg.flags.sqs_mode(),
            loopback_supported: cfg.flags.loopback_supported(),
            mac_addr: cfg.mac_addr,
        },
        MboxMessage::Ack => MboxUpdate::Ack,
        MboxMessage::Nack => MboxUpdate::Nack,
        MboxMessage::RssSize(rss) => MboxUpdate::RssSize(rss.ind_tbl_size.get()),
        MboxMessage::BgxLinkChange(link) => MboxUpdate::LinkChange(LinkStatus {
            link_up: link.link_up != 0,
            duplex: link.duplex,
            speed: link.speed.get(),
        }),
        msg => MboxUpdate::Unexpected(msg.kind()),
    }
}

#[derive(Default)]
struct MboxShared {
    pf_acked: bool,
    pf_nacked: bool,
    info: NicVfInfo,
}

impl MboxShared {
    fn apply(&mut self, update: MboxUpdate) {
        match update {
            MboxUpdate::Ready {
                vf_id,
                tns_mode,
                node,
                sqs_mode,
                loopback_supported,
                mac_addr,
            } => {
                self.info.vf_id = vf_id;
                self.info.tns_mode = tns_mode;
                self.info.node = node;
                self.info.sqs_mode = sqs_mode;
                self.info.loopback_supported = loopback_supported;
                self.info.mac_addr = mac_addr;
                self.pf_acked = true;
            }
            MboxUpdate::Ack => self.pf_acked = true,
            MboxUpdate::Nack => self.pf_nacked = true,
            MboxUpdate::RssSize(size) => {
                self.info.rss_size = size;
                self.pf_acked = true;
            }
            MboxUpdate::LinkChange(link) => {
                self.info.link = link;
                self.pf_acked = true;
            }
            MboxUpdate::Unexpected(_) => {}
        }
    }
}

/// The VF end of the mailbox.
///
/// Requests are serialized internally; only one is outstanding at a time.
/// [`NicVf::handle_mbox_interrupt`] may run concurrently with a request from
/// another thread.
pub struct NicVf<R> {
    device_id: String,
    bar0: R,
    config: MboxConfig,
    send_lock: Mutex<()>,
    shared: Mutex<MboxShared>,
    completion: Condvar,
}

impl<R: DeviceRegisterIo> NicVf<R> {
    /// Maps BAR0 of `device` and prepares the mailbox.
    pub fn new<T>(device: &mut T, config: MboxConfig) -> anyhow::Result<Self>
    where
        T: DeviceBacking<Registers = R>,
    {
        let bar0 = device.map_bar(0).context("failed to map bar0")?;
        if bar0.len() < NIC_VF_PF_MAILBOX_0_1 + MBOX_SIZE {
            anyhow::bail!(
                "bar0 of {} is too small for the mailbox: {:#x}",
                device.id(),
                bar0.len()
            );
        }
        tracing::debug!(device = device.id(), ?config, "mailbox ready");
        Ok(Self {
            device_id: device.id().to_owned(),
            bar0,
            config,
            send_lock: Mutex::new(()),
            shared: Mutex::new(MboxShared::default()),
            completion: Condvar::new(),
        })
    }

    /// Returns the device ID used in diagnostics.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the mailbox timing.
    pub fn config(&self) -> &MboxConfig {
        &self.config
    }

    /// Returns a snapshot of what the PF has reported so far.
    pub fn info(&self) -> NicVfInfo {
        self.shared.lock().info
    }

    fn send_raw(&self, msg: &MboxMessage) {
        fence(Ordering::Release);
        for (i, word) in msg.encode().into_iter().enumerate() {
            self.bar0
                .write_u64(NIC_VF_PF_MAILBOX_0_1 + i * size_of::<u64>(), word);
        }
        tracing::debug!(
            device = self.device_id.as_str(),
            vf_id = self.info().vf_id,
            kind = %msg.kind(),
            "mbox message sent"
        );
    }

    /// Sends `msg` without waiting for an acknowledgment.
    ///
    /// Holds the mailbox for the configured response delay afterwards so the PF
    /// can consume the message. Nothing confirms that it did.
    pub fn send_async(&self, msg: &MboxMessage) {
        let _send = self.send_lock.lock();
        self.send_raw(msg);
        std::thread::sleep(self.config.response_delay);
    }

    /// Sends `msg` and waits for the PF to ACK or NACK it, resending after
    /// each timeout.
    ///
    /// A NACK fails the request immediately without further attempts.
    pub fn send_and_wait(&self, msg: &MboxMessage) -> Result<(), MboxError> {
        let _send = self.send_lock.lock();
        let kind = msg.kind();
        let attempts = self.config.retries.max(1);
        for attempt in 1..=attempts {
            {
                let mut shared = self.shared.lock();
                shared.pf_acked = false;
                shared.pf_nacked = false;
            }
            self.send_raw(msg);

            let deadline = Instant::now() + self.config.timeout;
            let mut shared = self.shared.lock();
            while !shared.pf_acked && !shared.pf_nacked {
                if self
                    .completion
                    .wait_until(&mut shared, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if shared.pf_nacked {
                return Err(MboxError::Rejected { kind });
            }
            if shared.pf_acked {
                return Ok(());
            }
            let vf_id = shared.info.vf_id;
            drop(shared);

            tracing::warn!(
                device = self.device_id.as_str(),
                vf_id,
                msg_id = kind.0,
                %kind,
                attempt,
                attempts,
                "PF didn't ack mbox message"
            );
        }
        tracing::error!(
            device = self.device_id.as_str(),
            msg_id = kind.0,
            %kind,
            attempts,
            "PF never acked mbox message"
        );
        Err(MboxError::Busy { kind, attempts })
    }

    /// Services a mailbox interrupt.
    ///
    /// Reads the PF's message, marks the mailbox consumed, applies the state
    /// change and wakes any waiting request. Returns the received kind.
    pub fn handle_mbox_interrupt(&self) -> MboxMsgKind {
        let mut words = [0; NIC_PF_VF_MAILBOX_SIZE];
        for (i, word) in words.iter_mut().enumerate() {
            *word = self
                .bar0
                .read_u64(NIC_VF_PF_MAILBOX_0_1 + i * size_of::<u64>());
        }
        // Overwrite the message so we won't receive it again.
        fence(Ordering::Release);
        self.bar0.write_u64(NIC_VF_PF_MAILBOX_0_1, 0);

        let msg = MboxMessage::decode(&words);
        let kind = msg.kind();
        let update = classify(&msg);

        let mut shared = self.shared.lock();
        tracing::trace!(
            device = self.device_id.as_str(),
            vf_id = shared.info.vf_id,
            msg_id = kind.0,
            %kind,
            "mbox message received"
        );
        if let MboxUpdate::Unexpected(kind) = update {
            tracing::error!(
                device = self.device_id.as_str(),
                msg_id = kind.0,
                %kind,
                "invalid message from PF"
            );
        }
        shared.apply(update);
        drop(shared);
        self.completion.notify_all();
        kind
    }

    /// Checks that the PF is responsive and learns this VF's identity.
    ///
    /// On success the identity in [`NicVf::info`] is already populated: the
    /// READY reply sets it in the same step that completes the request.
    pub fn check_pf_ready(&self) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::Ready(NicCfgMsg::new_zeroed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nicvf_defs::BgxLinkStatusMsg;
    use nicvf_defs::NicCfgFlags;
    use nicvf_defs::RqCfgMsg;
    use nicvf_defs::RssSizeMsg;
    use zerocopy::little_endian::U16;
    use zerocopy::little_endian::U32;

    #[test]
    fn ready_masks_identity() {
        let update = classify(&MboxMessage::Ready(NicCfgMsg {
            vf_id: 0x85,
            node_id: 1,
            tns_mode: 0xff,
            flags: NicCfgFlags::new().with_sqs_mode(true),
            mac_addr: [1, 2, 3, 4, 5, 6],
            ..FromZeros::new_zeroed()
        }));
        assert_eq!(
            update,
            MboxUpdate::Ready {
                vf_id: 0x05,
                tns_mode: 0x7f,
                node: 1,
                sqs_mode: true,
                loopback_supported: false,
                mac_addr: [1, 2, 3, 4, 5, 6],
            }
        );
    }

    #[test]
    fn replies_with_side_effects() {
        assert_eq!(
            classify(&MboxMessage::RssSize(RssSizeMsg {
                ind_tbl_size: U16::new(128),
                ..FromZeros::new_zeroed()
            })),
            MboxUpdate::RssSize(128)
        );
        assert_eq!(
            classify(&MboxMessage::BgxLinkChange(BgxLinkStatusMsg {
                link_up: 1,
                duplex: 1,
                speed: U32::new(10000),
                ..FromZeros::new_zeroed()
            })),
            MboxUpdate::LinkChange(LinkStatus {
                link_up: true,
                duplex: 1,
                speed: 10000,
            })
        );
        assert_eq!(classify(&MboxMessage::Ack), MboxUpdate::Ack);
        assert_eq!(classify(&MboxMessage::Nack), MboxUpdate::Nack);
    }

    #[test]
    fn requests_from_pf_are_unexpected() {
        assert_eq!(
            classify(&MboxMessage::RqCfg(RqCfgMsg::new_zeroed())),
            MboxUpdate::Unexpected(MboxMsgKind::RQ_CFG)
        );
        assert_eq!(
            classify(&MboxMessage::decode(&[0x13, 0])),
            MboxUpdate::Unexpected(MboxMsgKind(0x13))
        );
        assert_eq!(
            classify(&MboxMessage::decode(&[0, 0])),
            MboxUpdate::Unexpected(MboxMsgKind::INVALID)
        );
    }

    #[test]
    fn unexpected_leaves_state_alone() {
        let mut shared = MboxShared::default();
        shared.apply(MboxUpdate::RssSize(64));
        shared.pf_acked = false;
        shared.apply(MboxUpdate::Unexpected(MboxMsgKind::SHUTDOWN));
        assert!(!shared.pf_acked);
        assert!(!shared.pf_nacked);
        assert_eq!(shared.info.rss_size, 64);
    }
}
