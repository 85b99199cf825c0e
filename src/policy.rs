//! Iteration caps for every bounded-poll loop in [`transport`](crate::transport)
//! and [`block`](crate::block).
//!
//! The original driver this crate is modeled on hard-coded these as inline
//! magic numbers (0xFE, 0x1FF, 0x511) at each call site. Bundling them in one
//! `Copy` value lets a caller retune retry behavior for a slower card or a
//! tighter deadline without touching the transport code, while `Policy::default`
//! reproduces the historical constants exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Dummy-byte iterations to wait for an R1 response after a command frame.
    pub r1_timeout: u32,
    /// Dummy-byte iterations to wait for the Start Block Token (0xFE/0xFC).
    pub start_token_timeout: u32,
    /// Dummy-byte iterations to wait for a write data-response token.
    pub data_response_timeout: u32,
    /// Iterations to wait for the card to stop holding DO low after a write.
    pub busy_wait_timeout: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            r1_timeout: 0xFE,
            start_token_timeout: 0x1FF,
            data_response_timeout: 0xFE,
            busy_wait_timeout: 0x511,
        }
    }
}
