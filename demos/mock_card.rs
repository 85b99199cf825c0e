//! A tiny in-memory SD card, just enough of the SPI wire protocol to answer
//! `ReadSingleBlock` so the demo can mount and walk a synthetic image without
//! real hardware.
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
        Self { sectors, frame: Vec::new(), queue: VecDeque::new() }
    }

    fn next_byte(&mut self, sent: u8) -> u8 {
        if !self.queue.is_empty() {
            return self.queue.pop_front().unwrap();
        }
        if self.frame.is_empty() && sent & 0xC0 != 0x40 {
            return 0xFF;
        }
        self.frame.push(sent);
        if self.frame.len() == 6 {
            self.decode_frame();
        }
        0xFF
    }

    fn decode_frame(&mut self) {
        let cmd = self.frame[0] & 0x3F;
        let arg = u32::from_be_bytes([self.frame[1], self.frame[2], self.frame[3], self.frame[4]]);
        self.frame.clear();
        self.queue.push_back(0x00); // R1: idle, no errors
        self.queue.push_back(0xFF); // trailing deselect dummy
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

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        for w in words.iter_mut() {
            *w = self.next_byte(*w);
        }
        Ok(words)
    }
}

pub struct NoopPin;

impl OutputPin for NoopPin {
    type Error = Infallible;
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
