//! Addressable word store behind the bridge, and the bus contract it serves.

/// Construction-time register layout.
pub mod image;

pub use image::{capacity_for, StorageImage, REFERENCE_CAPACITY, REFERENCE_IMAGE};

/// Result of a single bus read: the data word and its acknowledge strobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BusRead {
    /// Data word; zero when not acknowledged.
    pub value: u32,
    /// `true` when `value` is valid.
    pub ack: bool,
}

impl BusRead {
    /// Unacknowledged read.
    pub const NACK: Self = Self {
        value: 0,
        ack: false,
    };

    /// Acknowledged read carrying `value`.
    #[must_use]
    pub const fn acked(value: u32) -> Self {
        Self { value, ack: true }
    }

    /// Returns the data word when acknowledged.
    #[must_use]
    pub const fn value(self) -> Option<u32> {
        if self.ack {
            Some(self.value)
        } else {
            None
        }
    }
}

/// Register bus driven by the bridge.
///
/// Invalid addresses are never an error: writes to them are dropped and reads
/// of them are not acknowledged.
pub trait RegisterBus {
    /// Returns `true` when `addr` decodes to a backing register.
    fn decodes(&self, addr: u16) -> bool;

    /// Reads the word at `addr`.
    fn read(&mut self, addr: u16) -> BusRead;

    /// Writes `value` to `addr`; no-op for addresses that do not decode.
    fn write(&mut self, addr: u16, value: u32);

    /// Restores the power-on contents.
    fn reset(&mut self);
}

/// Power-of-two backing array with an address-validity mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    image: StorageImage,
    words: Box<[u32]>,
    valid: Box<[bool]>,
    index_mask: u16,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(StorageImage::reference())
    }
}

impl RegisterFile {
    /// Allocates a register file loaded with `image`.
    #[must_use]
    pub fn new(image: StorageImage) -> Self {
        let capacity = image.capacity();
        let mut valid = vec![false; capacity].into_boxed_slice();
        for (addr, _) in image.entries() {
            valid[usize::from(*addr)] = true;
        }
        let index_mask = u16::try_from(capacity - 1).unwrap_or(u16::MAX);
        let mut file = Self {
            image,
            words: vec![0; capacity].into_boxed_slice(),
            valid,
            index_mask,
        };
        file.load_image();
        file
    }

    /// Backing capacity in words.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` when no bit above the index range is set and the index
    /// is marked valid.
    #[must_use]
    pub fn is_valid(&self, addr: u16) -> bool {
        addr & !self.index_mask == 0 && self.valid[usize::from(addr & self.index_mask)]
    }

    /// Reads `addr`; acknowledged only for valid addresses.
    #[must_use]
    pub fn read(&self, addr: u16) -> BusRead {
        if self.is_valid(addr) {
            BusRead::acked(self.words[usize::from(addr)])
        } else {
            BusRead::NACK
        }
    }

    /// Overwrites `addr` with `value`; silently ignored for invalid addresses.
    pub fn write(&mut self, addr: u16, value: u32) {
        if self.is_valid(addr) {
            self.words[usize::from(addr)] = value;
        }
    }

    /// Restores exactly the initial image.
    pub fn reset(&mut self) {
        self.words.fill(0);
        self.load_image();
    }

    /// Current word at a valid address, without bus side effects.
    #[must_use]
    pub fn peek(&self, addr: u16) -> Option<u32> {
        self.read(addr).value()
    }

    /// Current `(address, value)` pairs for every valid address.
    #[must_use]
    pub fn contents(&self) -> Vec<(u16, u32)> {
        self.image
            .entries()
            .iter()
            .map(|(addr, _)| (*addr, self.words[usize::from(*addr)]))
            .collect()
    }

    fn load_image(&mut self) {
        for (addr, value) in self.image.entries() {
            self.words[usize::from(*addr)] = *value;
        }
    }
}

impl RegisterBus for RegisterFile {
    fn decodes(&self, addr: u16) -> bool {
        self.is_valid(addr)
    }

    fn read(&mut self, addr: u16) -> BusRead {
        Self::read(self, addr)
    }

    fn write(&mut self, addr: u16, value: u32) {
        Self::write(self, addr, value);
    }

    fn reset(&mut self) {
        Self::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::{BusRead, RegisterFile, StorageImage, REFERENCE_IMAGE};

    #[test]
    fn reference_file_holds_initial_image() {
        let file = RegisterFile::default();
        assert_eq!(file.capacity(), 256);
        for (addr, value) in REFERENCE_IMAGE {
            assert_eq!(file.read(addr), BusRead::acked(value));
        }
    }

    #[test]
    fn undeclared_index_inside_capacity_is_invalid() {
        let mut file = RegisterFile::default();
        assert!(!file.is_valid(4));
        assert_eq!(file.read(4), BusRead::NACK);
        file.write(4, 0x1234);
        assert_eq!(file.peek(4), None);
    }

    #[test]
    fn bits_above_index_range_make_address_invalid() {
        let mut file = RegisterFile::default();
        // 0x0100 aliases index 0 if the high bits were ignored.
        assert!(!file.is_valid(0x0100));
        assert!(!file.is_valid(0x01E7));
        file.write(0x0100, 0xFFFF_FFFF);
        assert_eq!(file.peek(0), Some(0x0123_4567));
    }

    #[test]
    fn write_then_read_returns_new_value() {
        let mut file = RegisterFile::default();
        file.write(2, 0xAAE7_55AA);
        assert_eq!(file.read(2), BusRead::acked(0xAAE7_55AA));
    }

    #[test]
    fn reset_restores_initial_image() {
        let mut file = RegisterFile::default();
        file.write(0, 0);
        file.write(231, 1);
        file.reset();
        assert_eq!(file.contents(), REFERENCE_IMAGE.to_vec());
    }

    #[test]
    fn zero_initialised_declared_address_is_valid() {
        let image = StorageImage::new([(0x10, 0)]).expect("valid image");
        let file = RegisterFile::new(image);
        assert_eq!(file.capacity(), 32);
        assert_eq!(file.read(0x10), BusRead::acked(0));
    }

    #[test]
    fn full_width_layout_uses_whole_address_space() {
        let image = StorageImage::new([(u16::MAX, 7)]).expect("valid image");
        let file = RegisterFile::new(image);
        assert_eq!(file.capacity(), 65_536);
        assert_eq!(file.peek(u16::MAX), Some(7));
        assert_eq!(file.peek(0), None);
    }

    #[test]
    fn bus_read_value_requires_ack() {
        assert_eq!(BusRead::acked(5).value(), Some(5));
        assert_eq!(BusRead::NACK.value(), None);
    }
}
