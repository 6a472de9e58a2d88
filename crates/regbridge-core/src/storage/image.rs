//! Construction-time register layout: valid addresses and their reset values.

use crate::ConfigError;

/// Valid addresses and initial words of the reference register file.
pub const REFERENCE_IMAGE: [(u16, u32); 5] = [
    (0x0000, 0x0123_4567),
    (0x0001, 0x89AB_CDE7),
    (0x0002, 0x0A0B_0C0D),
    (0x0003, 0x1020_3040),
    (0x00E7, 0xDEAD_BEEF),
];

/// Backing capacity of the reference register file.
pub const REFERENCE_CAPACITY: usize = capacity_for(REFERENCE_IMAGE[REFERENCE_IMAGE.len() - 1].0);

/// Smallest power-of-two capacity whose index range covers `highest`.
#[must_use]
pub const fn capacity_for(highest: u16) -> usize {
    (highest as usize + 1).next_power_of_two()
}

const _: () = assert_reference_layout();

const fn assert_reference_layout() {
    let mut index = 1;
    while index < REFERENCE_IMAGE.len() {
        assert!(
            REFERENCE_IMAGE[index - 1].0 < REFERENCE_IMAGE[index].0,
            "reference addresses must be strictly ascending"
        );
        index += 1;
    }
    assert!(REFERENCE_CAPACITY == 256, "reference capacity must be 256");
}

/// Validated set of register addresses with their reset values.
///
/// Entries are kept sorted by address. Every declared address is valid; all
/// other addresses are invalid and silently ignored by the register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageImage {
    entries: Vec<(u16, u32)>,
}

impl Default for StorageImage {
    fn default() -> Self {
        Self::reference()
    }
}

impl StorageImage {
    /// Builds an image from `(address, initial value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyImage`] when no address is declared and
    /// [`ConfigError::DuplicateAddress`] when an address appears twice.
    pub fn new(entries: impl IntoIterator<Item = (u16, u32)>) -> Result<Self, ConfigError> {
        let mut entries: Vec<_> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(ConfigError::EmptyImage);
        }
        entries.sort_unstable_by_key(|(addr, _)| *addr);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ConfigError::DuplicateAddress(pair[0].0));
        }
        Ok(Self { entries })
    }

    /// The reference layout: addresses `{0, 1, 2, 3, 231}`.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            entries: REFERENCE_IMAGE.to_vec(),
        }
    }

    /// Declared entries in ascending address order.
    #[must_use]
    pub fn entries(&self) -> &[(u16, u32)] {
        &self.entries
    }

    /// Highest declared address.
    #[must_use]
    pub fn highest_address(&self) -> u16 {
        self.entries.last().map_or(0, |(addr, _)| *addr)
    }

    /// Backing capacity in words.
    #[must_use]
    pub fn capacity(&self) -> usize {
        capacity_for(self.highest_address())
    }

    /// Returns `true` when `addr` is declared.
    #[must_use]
    pub fn contains(&self, addr: u16) -> bool {
        self.entries
            .binary_search_by_key(&addr, |(entry, _)| *entry)
            .is_ok()
    }
}
