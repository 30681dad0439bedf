use std::time::Duration;

/// Timeouts and retry budgets for both ends of a transfer.  The
/// defaults are those the monitor firmware has always used; tests
/// shorten the timeouts.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Receiver: how many times to send `C` before giving up.
    pub receive_handshake_retries: u32,
    /// Receiver: how long to wait for SOH after each `C`.
    pub receive_handshake_timeout: Duration,
    /// Receiver: per-byte timeout inside a block.
    pub byte_timeout: Duration,
    /// Receiver: how long to wait for the next SOH or EOT.
    pub frame_timeout: Duration,
    /// Receiver: consecutive failures tolerated before cancelling.
    pub receive_max_retries: u32,
    /// Receiver: once the line has been quiet this long, a flush is done.
    pub flush_quiet: Duration,
    /// Receiver: how long after the final ACK to keep eating duplicate EOTs.
    pub eot_drain: Duration,

    /// Sender: how many times to wait for the receiver's `C`.
    pub send_handshake_retries: u32,
    /// Sender: how long each wait for `C` lasts.
    pub send_handshake_timeout: Duration,
    /// Sender: how long to wait for ACK after a block.
    pub ack_timeout: Duration,
    /// Sender: sends of a single block before cancelling.
    pub block_retries: u32,
    /// Sender: sends of EOT before giving up.
    pub eot_retries: u32,
    /// Sender: how long to wait for ACK after EOT.
    pub eot_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> TransferConfig {
        TransferConfig {
            receive_handshake_retries: 16,
            receive_handshake_timeout: Duration::from_secs(3),
            byte_timeout: Duration::from_secs(1),
            frame_timeout: Duration::from_secs(2),
            receive_max_retries: 16,
            flush_quiet: Duration::from_millis(50),
            eot_drain: Duration::from_millis(500),

            send_handshake_retries: 10,
            send_handshake_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(5),
            block_retries: 10,
            eot_retries: 10,
            eot_timeout: Duration::from_secs(2),
        }
    }
}

impl TransferConfig {
    /// Every timeout divided by `factor`; retry budgets are unchanged.
    #[must_use]
    pub fn scaled_down(&self, factor: u32) -> TransferConfig {
        TransferConfig {
            receive_handshake_timeout: self.receive_handshake_timeout / factor,
            byte_timeout: self.byte_timeout / factor,
            frame_timeout: self.frame_timeout / factor,
            flush_quiet: self.flush_quiet / factor,
            eot_drain: self.eot_drain / factor,
            send_handshake_timeout: self.send_handshake_timeout / factor,
            ack_timeout: self.ack_timeout / factor,
            eot_timeout: self.eot_timeout / factor,
            ..self.clone()
        }
    }
}
