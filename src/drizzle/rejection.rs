//! Per-pixel rejection map
//!
//! A multi-channel 8-bit image flagging pixels excluded from integration.
//! Channels are stored planar: each channel is a contiguous
//! `width * height` byte plane. Only the two low bits of each sample are
//! meaningful.

/// Bit flag: the pixel was rejected as a high outlier.
pub const REJECT_HIGH: u8 = 0x01;

/// Bit flag: the pixel was rejected as a low outlier.
pub const REJECT_LOW: u8 = 0x02;

/// A multi-channel 8-bit rejection bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RejectionMap {
    width: i32,
    height: i32,
    channels: i32,
    data: Vec<u8>,
}

impl RejectionMap {
    /// Allocate a zero-filled map. Dimensions must be >= 1.
    pub fn new(width: i32, height: i32, channels: i32) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0; (width as usize) * (height as usize) * (channels as usize)],
        }
    }

    /// Map width in pixels.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Map height in pixels.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Number of channels.
    pub fn channels(&self) -> i32 {
        self.channels
    }

    /// True when the map holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte size of one channel plane.
    pub fn channel_size(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// One channel's plane as a byte slice.
    pub fn channel_data(&self, channel: i32) -> &[u8] {
        let size = self.channel_size();
        let start = (channel as usize) * size;
        &self.data[start..start + size]
    }

    /// Replace one channel's plane. `data` must be exactly one plane long.
    pub fn set_channel_data(&mut self, channel: i32, data: &[u8]) {
        let size = self.channel_size();
        let start = (channel as usize) * size;
        self.data[start..start + size].copy_from_slice(data);
    }

    /// Flags of the sample at (x, y) in the given channel.
    pub fn flags(&self, x: i32, y: i32, channel: i32) -> u8 {
        self.data[self.offset(x, y, channel)]
    }

    /// Set flag bits on the sample at (x, y) in the given channel.
    pub fn set_flags(&mut self, x: i32, y: i32, channel: i32, flags: u8) {
        let k = self.offset(x, y, channel);
        self.data[k] |= flags;
    }

    /// Count the low/high rejected samples in one channel.
    pub fn count_rejected(&self, channel: i32) -> (u64, u64) {
        let mut low = 0u64;
        let mut high = 0u64;
        for &b in self.channel_data(channel) {
            if b & REJECT_LOW != 0 {
                low += 1;
            }
            if b & REJECT_HIGH != 0 {
                high += 1;
            }
        }
        (low, high)
    }

    fn offset(&self, x: i32, y: i32, channel: i32) -> usize {
        (channel as usize) * self.channel_size()
            + (y as usize) * (self.width as usize)
            + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_and_counts() {
        let mut map = RejectionMap::new(4, 3, 2);
        map.set_flags(0, 0, 0, REJECT_LOW);
        map.set_flags(1, 2, 0, REJECT_HIGH);
        map.set_flags(3, 1, 1, REJECT_LOW | REJECT_HIGH);
        assert_eq!(map.count_rejected(0), (1, 1));
        assert_eq!(map.count_rejected(1), (1, 1));
        assert_eq!(map.flags(3, 1, 1), REJECT_LOW | REJECT_HIGH);
        assert_eq!(map.flags(2, 2, 1), 0);
    }

    #[test]
    fn test_channel_planes_are_independent() {
        let mut map = RejectionMap::new(2, 2, 3);
        map.set_flags(0, 0, 1, REJECT_LOW);
        assert_eq!(map.channel_data(0), &[0, 0, 0, 0]);
        assert_eq!(map.channel_data(1), &[REJECT_LOW, 0, 0, 0]);
        let plane = [REJECT_HIGH; 4];
        map.set_channel_data(2, &plane);
        assert_eq!(map.channel_data(2), &plane);
        assert_eq!(map.count_rejected(2), (0, 4));
    }
}
