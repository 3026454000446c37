// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Conversion between typed mailbox messages and mailbox register words.

use crate::BgxLinkStatusMsg;
use crate::CpiCfgMsg;
use crate::MBOX_PAYLOAD_SIZE;
use crate::MBOX_SIZE;
use crate::MboxMsgKind;
use crate::NIC_PF_VF_MAILBOX_SIZE;
use crate::NicCfgMsg;
use crate::QsCfgMsg;
use crate::ResetStatCfgMsg;
use crate::RqCfgMsg;
use crate::RssCfgMsg;
use crate::RssSizeMsg;
use crate::SetFrsMsg;
use crate::SetLoopbackMsg;
use crate::SetMacMsg;
use crate::SqCfgMsg;
use crate::SqsAllocMsg;
use zerocopy::IntoBytes;
use zerocopy::transmute;

/// A decoded mailbox message.
///
/// Both directions share the same format. Kinds that the PF only ever answers
/// with an empty body (ACK, NACK) or that the VF sends without one (CFG_DONE,
/// SHUTDOWN) have no payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MboxMessage {
    /// Sent empty by the VF; the PF's reply carries the VF configuration.
    Ready(NicCfgMsg),
    Ack,
    Nack,
    QsCfg(QsCfgMsg),
    RqCfg(RqCfgMsg),
    SqCfg(SqCfgMsg),
    RqDropCfg(RqCfgMsg),
    SetMac(SetMacMsg),
    SetMaxFrs(SetFrsMsg),
    CpiCfg(CpiCfgMsg),
    RssSize(RssSizeMsg),
    RssCfg(RssCfgMsg),
    RssCfgCont(RssCfgMsg),
    RqBpCfg(RqCfgMsg),
    RqSwSync(RqCfgMsg),
    BgxLinkChange(BgxLinkStatusMsg),
    AllocSqs(SqsAllocMsg),
    Loopback(SetLoopbackMsg),
    ResetStatCounter(ResetStatCfgMsg),
    CfgDone,
    Shutdown,
    /// A kind without a typed payload, including INVALID. The raw payload is
    /// kept so it can be logged or forwarded unchanged.
    Unknown {
        kind: MboxMsgKind,
        payload: [u8; MBOX_PAYLOAD_SIZE],
    },
}

impl MboxMessage {
    /// Returns the kind tag written to byte 0 of the mailbox.
    pub fn kind(&self) -> MboxMsgKind {
        match self {
            Self::Ready(_) => MboxMsgKind::READY,
            Self::Ack => MboxMsgKind::ACK,
            Self::Nack => MboxMsgKind::NACK,
            Self::QsCfg(_) => MboxMsgKind::QS_CFG,
            Self::RqCfg(_) => MboxMsgKind::RQ_CFG,
            Self::SqCfg(_) => MboxMsgKind::SQ_CFG,
            Self::RqDropCfg(_) => MboxMsgKind::RQ_DROP_CFG,
            Self::SetMac(_) => MboxMsgKind::SET_MAC,
            Self::SetMaxFrs(_) => MboxMsgKind::SET_MAX_FRS,
            Self::CpiCfg(_) => MboxMsgKind::CPI_CFG,
            Self::RssSize(_) => MboxMsgKind::RSS_SIZE,
            Self::RssCfg(_) => MboxMsgKind::RSS_CFG,
            Self::RssCfgCont(_) => MboxMsgKind::RSS_CFG_CONT,
            Self::RqBpCfg(_) => MboxMsgKind::RQ_BP_CFG,
            Self::RqSwSync(_) => MboxMsgKind::RQ_SW_SYNC,
            Self::BgxLinkChange(_) => MboxMsgKind::BGX_LINK_CHANGE,
            Self::AllocSqs(_) => MboxMsgKind::ALLOC_SQS,
            Self::Loopback(_) => MboxMsgKind::LOOPBACK,
            Self::ResetStatCounter(_) => MboxMsgKind::RESET_STAT_COUNTER,
            Self::CfgDone => MboxMsgKind::CFG_DONE,
            Self::Shutdown => MboxMsgKind::SHUTDOWN,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::Ready(p) => p.as_bytes(),
            Self::QsCfg(p) => p.as_bytes(),
            Self::RqCfg(p)
            | Self::RqDropCfg(p)
            | Self::RqBpCfg(p)
            | Self::RqSwSync(p) => p.as_bytes(),
            Self::SqCfg(p) => p.as_bytes(),
            Self::SetMac(p) => p.as_bytes(),
            Self::SetMaxFrs(p) => p.as_bytes(),
            Self::CpiCfg(p) => p.as_bytes(),
            Self::RssSize(p) => p.as_bytes(),
            Self::RssCfg(p) | Self::RssCfgCont(p) => p.as_bytes(),
            Self::BgxLinkChange(p) => p.as_bytes(),
            Self::AllocSqs(p) => p.as_bytes(),
            Self::Loopback(p) => p.as_bytes(),
            Self::ResetStatCounter(p) => p.as_bytes(),
            Self::Ack | Self::Nack | Self::CfgDone | Self::Shutdown => &[0; MBOX_PAYLOAD_SIZE],
            Self::Unknown { payload, .. } => payload,
        }
    }

    /// Encodes the message as the words to store to the mailbox, lowest
    /// offset first.
    pub fn encode(&self) -> [u64; NIC_PF_VF_MAILBOX_SIZE] {
        let mut buf = [0; MBOX_SIZE];
        buf[0] = self.kind().0;
        buf[1..].copy_from_slice(self.payload());
        let mut words = [0; NIC_PF_VF_MAILBOX_SIZE];
        for (word, chunk) in words.iter_mut().zip(buf.chunks_exact(size_of::<u64>())) {
            *word = u64::from_le_bytes(chunk.try_into().expect("chunk is one word"));
        }
        words
    }

    /// Decodes the words read from the mailbox, lowest offset first.
    ///
    /// Never fails: kinds without a typed payload decode to
    /// [`MboxMessage::Unknown`].
    pub fn decode(words: &[u64; NIC_PF_VF_MAILBOX_SIZE]) -> Self {
        let mut buf = [0; MBOX_SIZE];
        for (chunk, word) in buf.chunks_exact_mut(size_of::<u64>()).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let [kind, payload @ ..] = buf;
        match MboxMsgKind(kind) {
            MboxMsgKind::READY => Self::Ready(transmute!(payload)),
            MboxMsgKind::ACK => Self::Ack,
            MboxMsgKind::NACK => Self::Nack,
            MboxMsgKind::QS_CFG => Self::QsCfg(transmute!(payload)),
            MboxMsgKind::RQ_CFG => Self::RqCfg(transmute!(payload)),
            MboxMsgKind::SQ_CFG => Self::SqCfg(transmute!(payload)),
            MboxMsgKind::RQ_DROP_CFG => Self::RqDropCfg(transmute!(payload)),
            MboxMsgKind::SET_MAC => Self::SetMac(transmute!(payload)),
            MboxMsgKind::SET_MAX_FRS => Self::SetMaxFrs(transmute!(payload)),
            MboxMsgKind::CPI_CFG => Self::CpiCfg(transmute!(payload)),
            MboxMsgKind::RSS_SIZE => Self::RssSize(transmute!(payload)),
            MboxMsgKind::RSS_CFG => Self::RssCfg(transmute!(payload)),
            MboxMsgKind::RSS_CFG_CONT => Self::RssCfgCont(transmute!(payload)),
            MboxMsgKind::RQ_BP_CFG => Self::RqBpCfg(transmute!(payload)),
            MboxMsgKind::RQ_SW_SYNC => Self::RqSwSync(transmute!(payload)),
            MboxMsgKind::BGX_LINK_CHANGE => Self::BgxLinkChange(transmute!(payload)),
            MboxMsgKind::ALLOC_SQS => Self::AllocSqs(transmute!(payload)),
            MboxMsgKind::LOOPBACK => Self::Loopback(transmute!(payload)),
            MboxMsgKind::RESET_STAT_COUNTER => Self::ResetStatCounter(transmute!(payload)),
            MboxMsgKind::CFG_DONE => Self::CfgDone,
            MboxMsgKind::SHUTDOWN => Self::Shutdown,
            kind => Self::Unknown { kind, payload },
        }
    }
}
