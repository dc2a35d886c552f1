//! Product type derivation from a device model string

use tracing::warn;

/// Map a model like `MS220-8P` to the dashboard `productType` used to filter
/// network events. Unknown families fall back to `appliance`.
pub fn product_type_for_model(model: &str) -> &'static str {
    let model = model.trim().to_ascii_uppercase();
    let prefixes: &[(&str, &str)] = &[
        ("MS", "switch"),
        ("MR", "wireless"),
        ("CW", "wireless"),
        ("MX", "appliance"),
        ("Z", "appliance"),
        ("MV", "camera"),
        ("MG", "cellularGateway"),
        ("MT", "sensor"),
    ];

    match prefixes.iter().find(|(prefix, _)| model.starts_with(prefix)) {
        Some((_, product)) => product,
        None => {
            warn!(model = %model, "unrecognised device model, assuming appliance");
            "appliance"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_families() {
        assert_eq!(product_type_for_model("MS220-8P"), "switch");
        assert_eq!(product_type_for_model("mr46"), "wireless");
        assert_eq!(product_type_for_model("CW9166I"), "wireless");
        assert_eq!(product_type_for_model("Z3"), "appliance");
        assert_eq!(product_type_for_model("MV12"), "camera");
        assert_eq!(product_type_for_model("MG21"), "cellularGateway");
        assert_eq!(product_type_for_model("MT10"), "sensor");
    }

    #[test]
    fn test_unknown_falls_back_to_appliance() {
        assert_eq!(product_type_for_model("XYZ-1"), "appliance");
        assert_eq!(product_type_for_model(""), "appliance");
    }
}
