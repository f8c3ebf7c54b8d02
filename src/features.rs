//! Static feature-availability table, keyed by part number.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Feature flags and metadata for one part number. Read-only for the
/// process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAvailability {
    pub category: &'static str,
    pub region: &'static str,
    pub express_eligible: bool,
    pub hazmat_approved: bool,
    pub refrigerated_transport: bool,
    pub oversize_handling: bool,
    pub description: &'static str,
}

static FEATURE_TABLE: Lazy<HashMap<&'static str, FeatureAvailability>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        "PN-140801",
        FeatureAvailability {
            category: "industrial",
            region: "R1",
            express_eligible: true,
            hazmat_approved: false,
            refrigerated_transport: false,
            oversize_handling: true,
            description: "D1408 industrial assembly, region R1 routing",
        },
    );
    table.insert(
        "PN-140803",
        FeatureAvailability {
            category: "industrial",
            region: "R3",
            express_eligible: false,
            hazmat_approved: false,
            refrigerated_transport: false,
            oversize_handling: true,
            description: "D1408 industrial assembly, region R3 routing",
        },
    );
    table.insert(
        "PN-160101",
        FeatureAvailability {
            category: "electronics",
            region: "R1",
            express_eligible: true,
            hazmat_approved: false,
            refrigerated_transport: false,
            oversize_handling: false,
            description: "D1601 electronics module, region R1 routing",
        },
    );
    table.insert(
        "PN-160102",
        FeatureAvailability {
            category: "electronics",
            region: "R2",
            express_eligible: true,
            hazmat_approved: true,
            refrigerated_transport: false,
            oversize_handling: false,
            description: "D1601 electronics module with lithium cells, region R2 routing",
        },
    );
    table.insert(
        "PN-030301",
        FeatureAvailability {
            category: "perishable",
            region: "R1",
            express_eligible: true,
            hazmat_approved: false,
            refrigerated_transport: true,
            oversize_handling: false,
            description: "D0303 perishable goods, region R1 cold chain",
        },
    );
    table.insert(
        "PN-030304",
        FeatureAvailability {
            category: "perishable",
            region: "R4",
            express_eligible: false,
            hazmat_approved: false,
            refrigerated_transport: true,
            oversize_handling: false,
            description: "D0303 perishable goods, region R4 cold chain",
        },
    );
    table
});

/// Look up the feature flags for a part number. Blank input is "not found".
pub fn features_for(part_number: &str) -> Option<&'static FeatureAvailability> {
    if part_number.trim().is_empty() {
        return None;
    }
    FEATURE_TABLE.get(part_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_part_number_has_features() {
        let features = features_for("PN-030301").unwrap();
        assert_eq!(features.category, "perishable");
        assert!(features.refrigerated_transport);
        assert_eq!(features.region, "R1");
    }

    #[test]
    fn unknown_or_blank_part_number_is_none() {
        assert!(features_for("PN-999999").is_none());
        assert!(features_for("").is_none());
        assert!(features_for("   ").is_none());
    }
}
