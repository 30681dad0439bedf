use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Sender,
    Receiver,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        })
    }
}

/// Progress of one end of a transfer.  Block numbers start at 1 and
/// wrap from 255 to 0; the retry count is of consecutive failures.
#[derive(Debug)]
pub(crate) struct TransferSession {
    role: Role,
    next_block: u8,
    blocks_done: usize,
    retries: u32,
    max_retries: u32,
}

impl TransferSession {
    pub(crate) fn new(role: Role, max_retries: u32) -> TransferSession {
        TransferSession {
            role,
            next_block: 1,
            blocks_done: 0,
            retries: 0,
            max_retries,
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn next_block(&self) -> u8 {
        self.next_block
    }

    pub(crate) fn blocks_done(&self) -> usize {
        self.blocks_done
    }

    pub(crate) fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn expects(&self, number: u8) -> bool {
        number == self.next_block
    }

    /// True for a resend of the block accepted most recently.
    pub(crate) fn is_duplicate(&self, number: u8) -> bool {
        self.blocks_done > 0 && number == self.next_block.wrapping_sub(1)
    }

    /// The current block was transferred successfully.
    pub(crate) fn advance(&mut self) {
        self.next_block = self.next_block.wrapping_add(1);
        self.blocks_done += 1;
        self.retries = 0;
    }

    /// Progress was made without moving to a new block.
    pub(crate) fn reset_retries(&mut self) {
        self.retries = 0;
    }

    /// Counts a failure.  Returns true once the budget is used up.
    #[must_use]
    pub(crate) fn fail(&mut self) -> bool {
        self.retries += 1;
        self.retries >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_numbers_wrap() {
        let mut session = TransferSession::new(Role::Receiver, 4);
        assert!(session.expects(1));
        assert!(!session.is_duplicate(0));
        for _ in 0..255 {
            session.advance();
        }
        assert!(session.expects(0));
        assert!(session.is_duplicate(255));
        session.advance();
        assert!(session.expects(1));
        assert!(session.is_duplicate(0));
        assert_eq!(session.blocks_done(), 256);
    }

    #[test]
    fn test_retry_budget() {
        let mut session = TransferSession::new(Role::Sender, 3);
        assert!(!session.fail());
        assert!(!session.fail());
        session.reset_retries();
        assert!(!session.fail());
        assert!(!session.fail());
        assert!(session.fail());
        assert_eq!(session.retries(), 3);
        session.advance();
        assert_eq!(session.retries(), 0);
    }
}
