use anyhow::Result;

use crate::model::{ActorContext, TemplateDocument};
use crate::store::traits::{Store, TemplateRegistry};

/// Demonstration template document in the external registry format:
/// template name at the top level, nested by version.
pub fn seed_document() -> TemplateDocument {
    serde_json::from_value(serde_json::json!({
        "plate": {
            "1.0": {
                "category": "container",
                "type": "plate",
                "subtype": "fixed-plate-96",
                "is_singleton": false,
                "id_prefix": "PL",
                "properties": {
                    "wells": 96,
                    "material": "polypropylene"
                },
                "instantiation_layouts": [{
                    "name": "wells",
                    "target": "container/well/standard/1.0/",
                    "count": 96,
                    "naming_pattern": "{parent}-W{n}",
                    "relationship_type": "contains"
                }],
                "action_groups": { "default": ["seal", "centrifuge"] }
            }
        },
        "well": {
            "1.0": {
                "category": "container",
                "type": "well",
                "subtype": "standard",
                "id_prefix": "WL",
                "properties": { "volume_ul": 200 }
            }
        },
        "blood-sample": {
            "1.0": {
                "category": "sample",
                "type": "blood",
                "subtype": "whole",
                "id_prefix": "SM",
                "properties": {
                    "matrix": "whole-blood",
                    "volume_ul": 500
                },
                "actions": ["aliquot", "discard"]
            }
        },
        "freezer": {
            "1.0": {
                "category": "equipment",
                "type": "storage",
                "subtype": "minus-80",
                "is_singleton": true,
                "id_prefix": "EQ",
                "properties": { "temperature_c": -80 }
            }
        }
    }))
    .unwrap_or_else(|e| unreachable!("seed document is well-formed: {e}"))
}

/// Load the seed templates; registration is idempotent so re-running
/// against a populated store is harmless.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    let registered = store
        .register_document(seed_document(), &ActorContext::system())
        .await?;
    log::info!("seed data loaded: {} templates", registered.len());
    Ok(())
}
