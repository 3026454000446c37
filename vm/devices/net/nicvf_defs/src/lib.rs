// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Definitions for the ThunderX NIC VF/PF mailbox.
//!
//! The mailbox is a two-word register window in the VF's BAR0. A message is
//! one kind byte followed by a fixed-size, kind-specific payload. Unused
//! payload bytes are zero.

#![expect(missing_docs)]
#![forbid(unsafe_code)]

mod message;

pub use message::MboxMessage;

use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use std::fmt;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::little_endian::U16;
use zerocopy::little_endian::U32;
use zerocopy::little_endian::U64;

/// BAR0 offset of the VF/PF mailbox window.
pub const NIC_VF_PF_MAILBOX_0_1: usize = 0x130;
/// Mailbox window size in 64-bit words.
pub const NIC_PF_VF_MAILBOX_SIZE: usize = 2;
/// Mailbox window size in bytes.
pub const MBOX_SIZE: usize = NIC_PF_VF_MAILBOX_SIZE * size_of::<u64>();
/// Bytes following the kind byte.
pub const MBOX_PAYLOAD_SIZE: usize = MBOX_SIZE - 1;

pub const NICVF_MAC_ADDR_SIZE: usize = 6;
/// Number of RSS indirection table entries carried by one RSS_CFG message.
pub const RSS_IND_TBL_LEN_PER_MBX_MSG: usize = 8;

/// Valid bits of the VF id reported in a READY reply.
pub const NIC_VF_ID_MASK: u8 = 0x7f;
/// Valid bits of the TNS mode reported in a READY reply.
pub const NIC_TNS_MODE_MASK: u8 = 0x7f;

/// The message kind carried in byte 0 of the mailbox.
///
/// This is an open set: any byte can arrive from the PF, and values without
/// an assigned kind are reported by [`MboxMsgKind::name`] as `INVALID`.
#[repr(transparent)]
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
pub struct MboxMsgKind(pub u8);

macro_rules! mbox_msg_kinds {
    ($($name:ident = $value:expr,)*) => {
        impl MboxMsgKind {
            $(pub const $name: Self = Self($value);)*

            /// Returns the diagnostic label for this kind.
            ///
            /// Total over all values; anything without an assigned label maps
            /// to the `INVALID` label.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$name => concat!("NIC_MBOX_MSG_", stringify!($name)),)*
                    _ => "NIC_MBOX_MSG_INVALID",
                }
            }
        }
    };
}

mbox_msg_kinds! {
    INVALID = 0x00,
    READY = 0x01,
    ACK = 0x02,
    NACK = 0x03,
    QS_CFG = 0x04,
    RQ_CFG = 0x05,
    SQ_CFG = 0x06,
    RQ_DROP_CFG = 0x07,
    SET_MAC = 0x08,
    SET_MAX_FRS = 0x09,
    CPI_CFG = 0x0a,
    RSS_SIZE = 0x0b,
    RSS_CFG = 0x0c,
    RSS_CFG_CONT = 0x0d,
    RQ_BP_CFG = 0x0e,
    RQ_SW_SYNC = 0x0f,
    BGX_LINK_CHANGE = 0x11,
    ALLOC_SQS = 0x12,
    LOOPBACK = 0x16,
    RESET_STAT_COUNTER = 0x17,
    CFG_DONE = 0xf0,
    SHUTDOWN = 0xf1,
}

impl fmt::Debug for MboxMsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#04x})", self.name(), self.0)
    }
}

impl fmt::Display for MboxMsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[bitfield(u8)]
#[derive(PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct NicCfgFlags {
    pub sqs_mode: bool,
    pub loopback_supported: bool,
    #[bits(6)]
    _reserved: u8,
}

/// READY reply: the VF's identity as assigned by the PF.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct NicCfgMsg {
    pub vf_id: u8,
    pub node_id: u8,
    pub tns_mode: u8,
    pub flags: NicCfgFlags,
    pub mac_addr: [u8; NICVF_MAC_ADDR_SIZE],
    pub reserved: [u8; 5],
}

/// Queue set configuration.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct QsCfgMsg {
    pub num: u8,
    pub sqs_count: u8,
    pub reserved: [u8; 5],
    pub cfg: U64,
}

/// Receive queue configuration, shared by RQ_CFG, RQ_DROP_CFG, RQ_BP_CFG and
/// RQ_SW_SYNC.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct RqCfgMsg {
    pub qs_num: u8,
    pub rq_num: u8,
    pub reserved: [u8; 5],
    pub cfg: U64,
}

#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct SqCfgMsg {
    pub qs_num: u8,
    pub sq_num: u8,
    pub sqs_mode: u8,
    pub reserved: [u8; 4],
    pub cfg: U64,
}

#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct SetMacMsg {
    pub vf_id: u8,
    pub mac_addr: [u8; NICVF_MAC_ADDR_SIZE],
    pub reserved: [u8; 8],
}

/// Maximum frame size.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct SetFrsMsg {
    pub vf_id: u8,
    pub max_frs: U16,
    pub reserved: [u8; 12],
}

/// Channel parse index configuration.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct CpiCfgMsg {
    pub vf_id: u8,
    pub cpi_alg: u8,
    pub rq_cnt: u8,
    pub reserved: [u8; 12],
}

/// RSS indirection table size, sent empty by the VF and filled in by the PF.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct RssSizeMsg {
    pub vf_id: u8,
    pub ind_tbl_size: U16,
    pub reserved: [u8; 12],
}

/// One segment of the RSS indirection table.
///
/// Tables larger than [`RSS_IND_TBL_LEN_PER_MBX_MSG`] are sent as an RSS_CFG
/// followed by RSS_CFG_CONT messages, each carrying `tbl_len` entries that
/// start at `tbl_offset`.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct RssCfgMsg {
    pub vf_id: u8,
    pub hash_bits: u8,
    pub tbl_len: u8,
    pub tbl_offset: u8,
    pub ind_tbl: [u8; RSS_IND_TBL_LEN_PER_MBX_MSG],
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct BgxLinkStatusMsg {
    pub link_up: u8,
    pub duplex: u8,
    pub reserved: u8,
    pub speed: U32,
    pub reserved2: [u8; 8],
}

/// Secondary queue set allocation.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct SqsAllocMsg {
    pub spec: u8,
    pub qs_count: u8,
    pub reserved: [u8; 13],
}

#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct SetLoopbackMsg {
    pub vf_id: u8,
    pub enable: u8,
    pub reserved: [u8; 13],
}

#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct ResetStatCfgMsg {
    pub reserved0: u8,
    pub rx_stat_mask: U16,
    pub tx_stat_mask: u8,
    pub reserved1: u8,
    pub rq_stat_mask: U16,
    pub sq_stat_mask: U16,
    pub reserved2: [u8; 6],
}

const_assert_eq!(size_of::<NicCfgMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<QsCfgMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<RqCfgMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<SqCfgMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<SetMacMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<SetFrsMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<CpiCfgMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<RssSizeMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<RssCfgMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<BgxLinkStatusMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<SqsAllocMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<SetLoopbackMsg>(), MBOX_PAYLOAD_SIZE);
const_assert_eq!(size_of::<ResetStatCfgMsg>(), MBOX_PAYLOAD_SIZE);

/// RQ_DROP_CFG register value.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PfRqDropCfg {
    #[bits(8)]
    _reserved1: u8,
    pub cq_drop: u8,
    pub cq_pass: u8,
    #[bits(8)]
    _reserved2: u8,
    pub rbdr_drop: u8,
    pub rbdr_pass: u8,
    #[bits(14)]
    _reserved3: u16,
    pub cq_red: bool,
    pub rbdr_red: bool,
}

/// RQ_BP_CFG register value.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PfRqBpCfg {
    /// Backpressure id.
    pub bpid: u8,
    #[bits(54)]
    _reserved: u64,
    pub cq_bp_ena: bool,
    pub rbdr_bp_ena: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_is_total() {
        for v in 0..=u8::MAX {
            assert!(MboxMsgKind(v).name().starts_with("NIC_MBOX_MSG_"));
        }
        assert_eq!(MboxMsgKind(0x10).name(), "NIC_MBOX_MSG_INVALID");
        assert_eq!(MboxMsgKind(0x13).name(), "NIC_MBOX_MSG_INVALID");
        assert_eq!(MboxMsgKind(0xff).name(), "NIC_MBOX_MSG_INVALID");
        assert_eq!(MboxMsgKind::INVALID.name(), "NIC_MBOX_MSG_INVALID");
    }

    #[test]
    fn kind_names() {
        assert_eq!(MboxMsgKind::READY.name(), "NIC_MBOX_MSG_READY");
        assert_eq!(MboxMsgKind::ACK.name(), "NIC_MBOX_MSG_ACK");
        assert_eq!(MboxMsgKind::NACK.name(), "NIC_MBOX_MSG_NACK");
        assert_eq!(
            MboxMsgKind::BGX_LINK_CHANGE.name(),
            "NIC_MBOX_MSG_BGX_LINK_CHANGE"
        );
        assert_eq!(MboxMsgKind::SHUTDOWN.to_string(), "NIC_MBOX_MSG_SHUTDOWN");
        assert_eq!(
            format!("{:?}", MboxMsgKind(0x42)),
            "NIC_MBOX_MSG_INVALID(0x42)"
        );
    }

    #[test]
    fn rq_drop_cfg_layout() {
        let cfg = PfRqDropCfg::new().with_cq_red(true).with_cq_drop(2);
        assert_eq!(u64::from(cfg), (1 << 62) | (2 << 8));
    }

    #[test]
    fn rq_bp_cfg_layout() {
        let cfg = PfRqBpCfg::new()
            .with_rbdr_bp_ena(true)
            .with_cq_bp_ena(true)
            .with_bpid(5);
        assert_eq!(u64::from(cfg), (1 << 63) | (1 << 62) | 5);
    }

    #[test]
    fn nic_cfg_flags_layout() {
        let flags = NicCfgFlags::new().with_loopback_supported(true);
        assert_eq!(flags.as_bytes(), &[0b10]);
        assert!(!NicCfgFlags::from(0b01).loopback_supported());
        assert!(NicCfgFlags::from(0b01).sqs_mode());
    }
}
