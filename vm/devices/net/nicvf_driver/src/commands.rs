// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Requests the VF makes of the PF.
//!
//! Each request fills in one message and sends it through the mailbox. The
//! configuration values themselves are opaque here.

use crate::mbox::MboxError;
use crate::mbox::NicVf;
use nicvf_defs::CpiCfgMsg;
use nicvf_defs::MboxMessage;
use nicvf_defs::NICVF_MAC_ADDR_SIZE;
use nicvf_defs::PfRqBpCfg;
use nicvf_defs::PfRqDropCfg;
use nicvf_defs::QsCfgMsg;
use nicvf_defs::RSS_IND_TBL_LEN_PER_MBX_MSG;
use nicvf_defs::ResetStatCfgMsg;
use nicvf_defs::RqCfgMsg;
use nicvf_defs::RssCfgMsg;
use nicvf_defs::RssSizeMsg;
use nicvf_defs::SetFrsMsg;
use nicvf_defs::SetLoopbackMsg;
use nicvf_defs::SetMacMsg;
use nicvf_defs::SqCfgMsg;
use thiserror::Error;
use tracing::instrument;
use user_driver::DeviceRegisterIo;
use zerocopy::FromZeros;
use zerocopy::little_endian::U16;
use zerocopy::little_endian::U64;

/// The largest indirection table whose last segment offset fits the message.
const MAX_RSS_TABLE_LEN: usize = u8::MAX as usize + 1;

/// A failed multi-message request.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A segment of the RSS indirection table was not accepted. Segments
    /// before `offset` were already sent.
    #[error("RSS indirection table update failed at offset {offset}")]
    RssTableUpdate {
        /// Table offset of the failed segment.
        offset: usize,
        /// Why the segment failed.
        #[source]
        source: MboxError,
    },
    /// The table cannot be addressed by the mailbox.
    #[error("RSS indirection table has {len} entries, at most {MAX_RSS_TABLE_LEN} are supported")]
    RssTableTooLarge {
        /// Requested table length.
        len: usize,
    },
}

impl<R: DeviceRegisterIo> NicVf<R> {
    fn vf_id(&self) -> u8 {
        self.info().vf_id
    }

    /// Asks the PF to program `mac` as this VF's address.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn set_mac_addr(&self, mac: [u8; NICVF_MAC_ADDR_SIZE]) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::SetMac(SetMacMsg {
            vf_id: self.vf_id(),
            mac_addr: mac,
            ..FromZeros::new_zeroed()
        }))
    }

    /// Configures the channel parse index for `rq_cnt` receive queues.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn config_cpi(&self, cpi_alg: u8, rq_cnt: u8) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::CpiCfg(CpiCfgMsg {
            vf_id: self.vf_id(),
            cpi_alg,
            rq_cnt,
            ..FromZeros::new_zeroed()
        }))
    }

    /// Queries the RSS indirection table size.
    ///
    /// The reply also updates [`NicVf::info`].
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn get_rss_size(&self) -> Result<u16, MboxError> {
        self.send_and_wait(&MboxMessage::RssSize(RssSizeMsg {
            vf_id: self.vf_id(),
            ..FromZeros::new_zeroed()
        }))?;
        Ok(self.info().rss_size)
    }

    /// Programs the RSS indirection table.
    ///
    /// The table goes out in segments of [`RSS_IND_TBL_LEN_PER_MBX_MSG`]
    /// entries, the first as RSS_CFG and the rest as RSS_CFG_CONT. The first
    /// segment that fails aborts the update.
    #[instrument(
        skip(self, ind_tbl),
        fields(device = self.device_id(), len = ind_tbl.len()),
        level = "debug",
        err
    )]
    pub fn config_rss(&self, hash_bits: u8, ind_tbl: &[u8]) -> Result<(), CommandError> {
        if ind_tbl.len() > MAX_RSS_TABLE_LEN {
            return Err(CommandError::RssTableTooLarge { len: ind_tbl.len() });
        }
        let vf_id = self.vf_id();
        for (i, segment) in ind_tbl.chunks(RSS_IND_TBL_LEN_PER_MBX_MSG).enumerate() {
            let offset = i * RSS_IND_TBL_LEN_PER_MBX_MSG;
            let mut cfg = RssCfgMsg {
                vf_id,
                hash_bits,
                tbl_len: segment.len() as u8,
                tbl_offset: offset as u8,
                ..FromZeros::new_zeroed()
            };
            cfg.ind_tbl[..segment.len()].copy_from_slice(segment);
            let msg = if offset == 0 {
                MboxMessage::RssCfg(cfg)
            } else {
                MboxMessage::RssCfgCont(cfg)
            };
            self.send_and_wait(&msg)
                .map_err(|source| CommandError::RssTableUpdate { offset, source })?;
        }
        Ok(())
    }

    /// Configures receive queue `qidx`.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn rq_config(&self, qidx: u8, cfg: u64) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::RqCfg(RqCfgMsg {
            qs_num: self.vf_id(),
            rq_num: qidx,
            cfg: U64::new(cfg),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Configures send queue `qidx`.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn sq_config(&self, qidx: u8) -> Result<(), MboxError> {
        let info = self.info();
        self.send_and_wait(&MboxMessage::SqCfg(SqCfgMsg {
            qs_num: info.vf_id,
            sq_num: qidx,
            sqs_mode: info.sqs_mode.into(),
            cfg: U64::new((u64::from(info.vf_id) << 3) | u64::from(qidx)),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Configures this VF's queue set.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn qset_config(&self, cfg: u64) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::QsCfg(QsCfgMsg {
            num: self.vf_id(),
            cfg: U64::new(cfg),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Enables or disables CQ drop on receive queue `qidx`, reserving
    /// completion entries for transmitted packets.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn rq_drop_config(&self, qidx: u8, enable: bool) -> Result<(), MboxError> {
        let mut drop_cfg = PfRqDropCfg::new();
        if enable {
            drop_cfg = drop_cfg.with_cq_red(true).with_cq_drop(2);
        }
        self.send_and_wait(&MboxMessage::RqDropCfg(RqCfgMsg {
            qs_num: self.vf_id(),
            rq_num: qidx,
            cfg: U64::new(drop_cfg.into()),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Sets the maximum frame size.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn update_hw_max_frs(&self, mtu: u16) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::SetMaxFrs(SetFrsMsg {
            vf_id: self.vf_id(),
            max_frs: U16::new(mtu),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Waits for all packets in the receive pipeline to be written back to
    /// memory.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn rq_sync(&self) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::RqSwSync(RqCfgMsg::new_zeroed()))
    }

    /// Enables or disables backpressure on receive queue `qidx`.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn rq_bp_config(&self, qidx: u8, enable: bool) -> Result<(), MboxError> {
        let vf_id = self.vf_id();
        let mut bp_cfg = PfRqBpCfg::new();
        if enable {
            bp_cfg = bp_cfg
                .with_rbdr_bp_ena(true)
                .with_cq_bp_ena(true)
                .with_bpid(vf_id);
        }
        self.send_and_wait(&MboxMessage::RqBpCfg(RqCfgMsg {
            qs_num: vf_id,
            rq_num: qidx,
            cfg: U64::new(bp_cfg.into()),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Enables or disables internal loopback.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn loopback_config(&self, enable: bool) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::Loopback(SetLoopbackMsg {
            vf_id: self.vf_id(),
            enable: enable.into(),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Clears the statistics counters selected by the masks.
    #[instrument(skip(self), fields(device = self.device_id()), level = "debug", err)]
    pub fn reset_stat_counters(
        &self,
        rx_stat_mask: u16,
        tx_stat_mask: u8,
        rq_stat_mask: u16,
        sq_stat_mask: u16,
    ) -> Result<(), MboxError> {
        self.send_and_wait(&MboxMessage::ResetStatCounter(ResetStatCfgMsg {
            rx_stat_mask: U16::new(rx_stat_mask),
            tx_stat_mask,
            rq_stat_mask: U16::new(rq_stat_mask),
            sq_stat_mask: U16::new(sq_stat_mask),
            ..FromZeros::new_zeroed()
        }))
    }

    /// Tells the PF this VF is going away.
    pub fn shutdown(&self) {
        if let Err(err) = self.send_and_wait(&MboxMessage::Shutdown) {
            tracing::warn!(
                device = self.device_id(),
                error = &err as &dyn std::error::Error,
                "shutdown not acknowledged"
            );
        }
    }

    /// Tells the PF that configuration is complete. Not acknowledged.
    pub fn cfg_done(&self) {
        self.send_async(&MboxMessage::CfgDone);
    }
}
