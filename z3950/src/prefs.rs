//! Global implementation preferences.
//!
//! Canned values for Init exchanges: sizes, implementation identity,
//! and which protocol services this side offers.  Applied once at
//! startup and read-only afterward.
use std::sync::OnceLock;

// Generous defaults, matching what the large public servers accept.
const DEFAULT_PREFERRED_MESSAGE_SIZE: u32 = 67108864;
const DEFAULT_EXCEPTIONAL_RECORD_SIZE: u32 = 67108864;

static IMPLEMENTATION_PREFS: OnceLock<ImplementationPrefs> = OnceLock::new();

/// Which protocol services are offered in the Options bit string.
///
/// Bit positions per the Initialize ASN.1: search=0, present=1,
/// delSet=2, resourceReport=3, triggerResourceCtrl=4, resourceCtrl=5,
/// accessCtrl=6, scan=7, sort=8, (9 reserved), extendedServices=10,
/// level1Segmentation=11, level2Segmentation=12,
/// concurrentOperations=13, namedResultSets=14.
///
/// # References
///
/// * <https://www.loc.gov/z3950/agency/asn1.html#Options>
#[derive(Debug, Default)]
pub struct InitOptions {
    pub search: bool,
    pub present: bool,
    pub del_set: bool,
    pub scan: bool,
    pub sort: bool,
    pub extended_services: bool,
    pub concurrent_operations: bool,
    pub named_result_sets: bool,
}

impl InitOptions {
    fn positioned(&self) -> [bool; 15] {
        let mut bits = [false; 15];
        bits[0] = self.search;
        bits[1] = self.present;
        bits[2] = self.del_set;
        bits[7] = self.scan;
        bits[8] = self.sort;
        bits[10] = self.extended_services;
        bits[13] = self.concurrent_operations;
        bits[14] = self.named_result_sets;
        bits
    }

    /// BIT STRING content octets: the unused-bit count followed by
    /// the option bits, most significant bit first (bit 0 = search).
    pub fn to_bit_bytes(&self) -> Vec<u8> {
        let mut bits: u16 = 0;
        for (idx, val) in self.positioned().iter().enumerate() {
            if *val {
                bits |= 0x8000 >> idx;
            }
        }
        vec![0x00, (bits >> 8) as u8, bits as u8]
    }
}

/// Per-implementation preferences carried in Init messages.
#[derive(Debug)]
pub struct ImplementationPrefs {
    pub implementation_id: Option<String>,
    pub implementation_name: Option<String>,
    pub implementation_version: Option<String>,
    pub preferred_message_size: u32,
    pub exceptional_record_size: u32,
    pub init_options: InitOptions,
}

impl Default for ImplementationPrefs {
    fn default() -> Self {
        ImplementationPrefs {
            implementation_id: None,
            implementation_name: None,
            implementation_version: None,
            preferred_message_size: DEFAULT_PREFERRED_MESSAGE_SIZE,
            exceptional_record_size: DEFAULT_EXCEPTIONAL_RECORD_SIZE,
            init_options: InitOptions::default(),
        }
    }
}

impl ImplementationPrefs {
    /// The globally applied preferences, falling back to defaults if
    /// none were applied.
    pub fn global() -> &'static ImplementationPrefs {
        IMPLEMENTATION_PREFS.get_or_init(ImplementationPrefs::default)
    }

    /// Store this instance as the process-wide preferences.
    ///
    /// # Panics
    ///
    /// Panics if preferences were already applied (or defaulted).
    pub fn apply(self) {
        if IMPLEMENTATION_PREFS.set(self).is_err() {
            panic!("Global ImplementationPrefs already applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_bits() {
        let options = InitOptions {
            search: true,
            present: true,
            ..Default::default()
        };
        assert_eq!(options.to_bit_bytes(), vec![0x00, 0xC0, 0x00]);

        let options = InitOptions {
            search: true,
            present: true,
            del_set: true,
            scan: true,
            sort: true,
            named_result_sets: true,
            ..Default::default()
        };
        assert_eq!(options.to_bit_bytes(), vec![0x00, 0xE1, 0x82]);
    }
}
