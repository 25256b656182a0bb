use crate::model::{Euid, InstantiationLayout, NewInstance};

/// Bulk child creation is chunked so failures are bounded and progress
/// is observable; one store transaction per chunk.
pub const LAYOUT_CHUNK_SIZE: usize = 100;

/// Substitute the layout naming-pattern variables: `{parent}` is the
/// parent EUID, `{n}` the 1-based child index.
pub fn child_name(pattern: &str, parent: &Euid, n: usize) -> String {
    pattern
        .replace("{parent}", parent.as_str())
        .replace("{n}", &n.to_string())
}

/// Expand a layout into the inputs for its child instances. The store
/// materializes these in `LAYOUT_CHUNK_SIZE` batches and links each
/// child to the parent with the layout's relationship type.
pub fn expand_layout(layout: &InstantiationLayout, parent: &Euid) -> Vec<NewInstance> {
    (1..=layout.count)
        .map(|n| {
            NewInstance::from_template_code(layout.target.clone()).with_property(
                "name",
                serde_json::Value::String(child_name(&layout.naming_pattern, parent, n)),
            )
        })
        .collect()
}
