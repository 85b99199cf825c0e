//! An in-memory SD card: a `Vec<[u8; 512]>`-backed `Transfer<u8>`/`OutputPin`
//! pair that understands just enough of the SD SPI command/response wire
//! format to answer `ReadSingleBlock`, which is all `mount`/`cd`/`ls`/`cat`
//! ever issue.
use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

const START_BLOCK_TOKEN: u8 = 0xFE;

pub struct MockCard {
    sectors: Vec<[u8; 512]>,
    frame: Vec<u8>,
    queue: VecDeque<u8>,
}

impl MockCard {
    pub fn new(sectors: Vec<[u8; 512]>) -> Self {
        Self {
            sectors,
            frame: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    fn next_byte(&mut self, sent: u8) -> u8 {
        if self.frame.is_empty() {
            if sent & 0xC0 == 0x40 {
                self.frame.push(sent);
            }
            return 0xFF;
        }
        if self.frame.len() < 6 {
            self.frame.push(sent);
            if self.frame.len() == 6 {
                self.decode_frame();
            }
            return 0xFF;
        }
        self.queue.pop_front().unwrap_or(0xFF)
    }

    fn decode_frame(&mut self) {
        let cmd = self.frame[0] & 0x3F;
        let arg = u32::from_be_bytes([self.frame[1], self.frame[2], self.frame[3], self.frame[4]]);
        self.frame.clear();

        // R1 (always idle/success in this mock), then one filler byte for
        // the dummy clock `Transport::deselect` sends after every command.
        self.queue.push_back(0x00);
        self.queue.push_back(0xFF);

        if cmd == 17 {
            let sector = self.sectors.get(arg as usize).copied().unwrap_or([0u8; 512]);
            self.queue.push_back(START_BLOCK_TOKEN);
            self.queue.extend(sector);
            self.queue.push_back(0xFF);
            self.queue.push_back(0xFF);
        }
    }
}

impl Transfer<u8> for MockCard {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
        for w in words.iter_mut() {
            *w = self.next_byte(*w);
        }
        Ok(words)
    }
}

/// A chip-select pin that does nothing: the mock card tracks protocol state
/// from the byte stream alone, not from CS transitions.
pub struct NoopPin;

impl OutputPin for NoopPin {
    type Error = Infallible;
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}
