// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A scripted PF on the far side of an emulated BAR0.

use crate::MboxConfig;
use crate::NicVf;
use nicvf_defs::MboxMessage;
use nicvf_defs::NIC_PF_VF_MAILBOX_SIZE;
use nicvf_defs::NIC_VF_PF_MAILBOX_0_1;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use user_driver::emulated::BarPeer;
use user_driver::emulated::EmulatedBar;
use user_driver::emulated::EmulatedDevice;

pub const BAR0_LEN: usize = 0x1000;

const WORD0: usize = NIC_VF_PF_MAILBOX_0_1;
const WORD1: usize = NIC_VF_PF_MAILBOX_0_1 + size_of::<u64>();

/// Short timeouts so that exhausted retries finish quickly.
pub fn test_config() -> MboxConfig {
    MboxConfig::default()
        .with_timeout(Duration::from_millis(20))
        .with_response_delay(Duration::from_millis(2))
}

pub fn new_vf(config: MboxConfig) -> (Arc<NicVf<EmulatedBar>>, BarPeer) {
    super::init_tracing();
    let mut device = EmulatedDevice::new("nicvf-test", BAR0_LEN);
    let peer = device.peer();
    let vf = NicVf::new(&mut device, config).unwrap();
    (Arc::new(vf), peer)
}

/// Posts `msg` to the mailbox as the PF and raises the interrupt.
pub fn deliver(vf: &NicVf<EmulatedBar>, peer: &BarPeer, msg: &MboxMessage) {
    let [word0, word1] = msg.encode();
    peer.write_u64(WORD1, word1);
    peer.write_u64(WORD0, word0);
    vf.handle_mbox_interrupt();
}

pub fn mailbox_words(peer: &BarPeer) -> [u64; NIC_PF_VF_MAILBOX_SIZE] {
    [peer.read_u64(WORD0), peer.read_u64(WORD1)]
}

/// Answers each request the VF sends with whatever `respond` returns.
///
/// A request is complete once its last word is stored. Requests are handled
/// on a separate thread so the VF sees replies through its interrupt path
/// while it waits.
pub struct MockPf {
    peer: BarPeer,
    requests: Arc<Mutex<Vec<MboxMessage>>>,
    thread: Option<JoinHandle<()>>,
}

impl MockPf {
    pub fn spawn(
        vf: &Arc<NicVf<EmulatedBar>>,
        peer: &BarPeer,
        mut respond: impl FnMut(&MboxMessage) -> Option<MboxMessage> + Send + 'static,
    ) -> Self {
        let (send, recv) = mpsc::channel::<[u64; NIC_PF_VF_MAILBOX_SIZE]>();
        let pending = Mutex::new(0);
        peer.set_write_hook(move |offset, value| match offset {
            WORD0 => *pending.lock() = value,
            WORD1 => {
                let _ = send.send([*pending.lock(), value]);
            }
            _ => {}
        });

        let requests = Arc::new(Mutex::new(Vec::new()));
        let thread = std::thread::spawn({
            let vf = vf.clone();
            let peer = peer.clone();
            let requests = requests.clone();
            move || {
                for words in recv {
                    let request = MboxMessage::decode(&words);
                    requests.lock().push(request);
                    if let Some(reply) = respond(&request) {
                        deliver(&vf, &peer, &reply);
                    }
                }
            }
        });

        Self {
            peer: peer.clone(),
            requests,
            thread: Some(thread),
        }
    }

    /// Stops answering and returns every request seen, in order.
    pub fn finish(mut self) -> Vec<MboxMessage> {
        self.stop();
        std::mem::take(&mut *self.requests.lock())
    }

    fn stop(&mut self) {
        // Dropping the hook drops the channel sender, which ends the thread
        // once queued requests are handled.
        self.peer.clear_write_hook();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

impl Drop for MockPf {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn ack_all(_: &MboxMessage) -> Option<MboxMessage> {
    Some(MboxMessage::Ack)
}

pub fn ignore_all(_: &MboxMessage) -> Option<MboxMessage> {
    None
}
