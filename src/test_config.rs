//! Case counts for the property tests.
//!
//! Codec and header properties run a few hundred cases natively. Under Miri
//! every case is interpreted, so the count drops to a handful.
//!
//! ```ignore
//! use crate::test_config::miri_case_count;
//!
//! proptest! {
//!     #![proptest_config(ProptestConfig {
//!         cases: miri_case_count(),
//!         ..ProptestConfig::default()
//!     })]
//!     #[test]
//!     fn angle_survives_longtics(angle in any::<i16>()) {
//!         // ...
//!     }
//! }
//! ```

/// Cases per property test: 5 under Miri, 256 otherwise.
#[must_use]
pub const fn miri_case_count() -> u32 {
    if cfg!(miri) {
        5
    } else {
        256
    }
}
