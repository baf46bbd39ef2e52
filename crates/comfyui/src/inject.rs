//! Runtime parameter injection into workflow graphs.
//!
//! ComfyUI workflows are externally authored JSON graphs (node id ->
//! `class_type` + `inputs`), so injection is a best-effort heuristic:
//! recognized node kinds get their known fields overwritten from the
//! request parameters, everything else passes through untouched. Fields
//! are only ever overwritten, never added: a node that does not carry
//! e.g. a `batch_size` input keeps not carrying one.

use serde_json::{Map, Value};

/// Closed set of node kinds the injector understands.
///
/// Keeping the set explicit keeps the matching auditable; any new
/// `class_type` lands in [`Unrecognized`](NodeKind::Unrecognized) and
/// is passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    /// `CLIPTextEncode`: positive or negative prompt text.
    PromptEncoder,
    /// Empty canvas / latent nodes carrying dimensions and batch size.
    EmptyLatent,
    /// `KSampler` family: steps, cfg, and seed fields.
    Sampler,
    /// Anything else: passthrough.
    Unrecognized,
}

impl NodeKind {
    fn classify(class_type: &str) -> Self {
        match class_type {
            "CLIPTextEncode" => NodeKind::PromptEncoder,
            "EmptyLatentImage" | "EmptySD3LatentImage" | "EmptyHunyuanLatentVideo" => {
                NodeKind::EmptyLatent
            }
            "KSampler" | "KSamplerAdvanced" => NodeKind::Sampler,
            _ => NodeKind::Unrecognized,
        }
    }
}

/// Inject generation parameters into a workflow graph.
///
/// Operates on a deep copy; the input graph is never mutated.
///
/// Recognized params: `prompt`, `negative_prompt`, `width`, `height`,
/// `steps`, `cfg_scale`, `seed`, `frames`, `fps`, `batch_size`.
///
/// A seed of `-1` (or an absent seed) is resolved to one random 32-bit
/// value for the whole call, so every sampler in the graph shares the
/// same seed.
pub fn inject_params(workflow: &Value, params: &Value) -> Value {
    let mut injected = workflow.clone();
    let seed = resolve_seed(params);

    let Some(nodes) = injected.as_object_mut() else {
        return injected;
    };

    for node in nodes.values_mut() {
        let Some(node_map) = node.as_object() else {
            continue;
        };

        let kind = node_map
            .get("class_type")
            .and_then(Value::as_str)
            .map_or(NodeKind::Unrecognized, NodeKind::classify);
        let is_negative = kind == NodeKind::PromptEncoder && has_negative_title(node_map);

        let Some(inputs) = node
            .as_object_mut()
            .and_then(|m| m.get_mut("inputs"))
            .and_then(Value::as_object_mut)
        else {
            continue;
        };

        match kind {
            NodeKind::PromptEncoder => {
                let key = if is_negative { "negative_prompt" } else { "prompt" };
                overwrite(inputs, "text", params, key);
            }
            NodeKind::EmptyLatent => {
                overwrite(inputs, "width", params, "width");
                overwrite(inputs, "height", params, "height");
                overwrite(inputs, "batch_size", params, "batch_size");
                overwrite(inputs, "length", params, "frames");
            }
            NodeKind::Sampler => {
                overwrite(inputs, "steps", params, "steps");
                overwrite(inputs, "cfg", params, "cfg_scale");
                set_if_present(inputs, "seed", seed.into());
                set_if_present(inputs, "noise_seed", seed.into());
            }
            NodeKind::Unrecognized => {}
        }

        // Any node with an fps input gets the requested frame rate,
        // whatever its kind.
        overwrite(inputs, "fps", params, "fps");
    }

    injected
}

/// Resolve the seed for one injection call.
///
/// `-1` is the "random seed" sentinel; absent means the same. Explicit
/// seeds pass through at full width, since sampler seeds are 64-bit.
fn resolve_seed(params: &Value) -> i64 {
    let requested = params.get("seed").and_then(Value::as_i64).unwrap_or(-1);
    if requested == -1 {
        i64::from(rand::random::<u32>())
    } else {
        requested
    }
}

/// Overwrite `inputs[field]` from `params[key]`, only when the field is
/// already present on the node and the param was supplied.
fn overwrite(inputs: &mut Map<String, Value>, field: &str, params: &Value, key: &str) {
    if let Some(value) = params.get(key) {
        if let Some(slot) = inputs.get_mut(field) {
            *slot = value.clone();
        }
    }
}

/// Overwrite `inputs[field]` with `value` when the field exists.
fn set_if_present(inputs: &mut Map<String, Value>, field: &str, value: Value) {
    if let Some(slot) = inputs.get_mut(field) {
        *slot = value;
    }
}

/// Whether a prompt-encoder node's `_meta.title` marks it as the
/// negative prompt.
fn has_negative_title(node: &Map<String, Value>) -> bool {
    let title = node
        .get("_meta")
        .and_then(|meta| meta.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    title.contains("negative") || title.contains("neg")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_workflow() -> Value {
        json!({
            "1": {
                "class_type": "CLIPTextEncode",
                "inputs": {"text": "default positive", "clip": ["4", 1]}
            },
            "2": {
                "class_type": "CLIPTextEncode",
                "_meta": {"title": "Negative Prompt"},
                "inputs": {"text": "default negative", "clip": ["4", 1]}
            },
            "3": {
                "class_type": "EmptyLatentImage",
                "inputs": {"width": 512, "height": 512, "batch_size": 1}
            },
            "5": {
                "class_type": "KSampler",
                "inputs": {"steps": 20, "cfg": 7.0, "seed": 0}
            },
            "6": {
                "class_type": "KSamplerAdvanced",
                "inputs": {"steps": 20, "cfg": 7.0, "noise_seed": 0}
            },
            "7": {
                "class_type": "SaveImage",
                "inputs": {"filename_prefix": "out"}
            }
        })
    }

    #[test]
    fn empty_params_leave_unrecognized_graph_untouched() {
        let workflow = json!({
            "10": {"class_type": "CustomNodeXYZ", "inputs": {"foo": 1}},
            "11": {"class_type": "SaveImage", "inputs": {"filename_prefix": "out"}}
        });
        let injected = inject_params(&workflow, &json!({}));
        assert_eq!(injected, workflow);
    }

    #[test]
    fn input_graph_is_never_mutated() {
        let workflow = sample_workflow();
        let before = workflow.clone();
        let _ = inject_params(&workflow, &json!({"prompt": "a castle", "seed": 7}));
        assert_eq!(workflow, before);
    }

    #[test]
    fn prompt_routing_respects_negative_title() {
        let injected = inject_params(
            &sample_workflow(),
            &json!({"prompt": "a castle", "negative_prompt": "blurry"}),
        );
        assert_eq!(injected["1"]["inputs"]["text"], "a castle");
        assert_eq!(injected["2"]["inputs"]["text"], "blurry");
    }

    #[test]
    fn latent_fields_only_overwrite_existing() {
        let injected = inject_params(
            &sample_workflow(),
            &json!({"width": 1024, "height": 768, "frames": 16}),
        );
        let inputs = &injected["3"]["inputs"];
        assert_eq!(inputs["width"], 1024);
        assert_eq!(inputs["height"], 768);
        // The image latent has no `length` field; `frames` must not add one.
        assert!(inputs.get("length").is_none());
    }

    #[test]
    fn explicit_seed_reaches_every_seed_field() {
        let injected = inject_params(&sample_workflow(), &json!({"seed": 42}));
        assert_eq!(injected["5"]["inputs"]["seed"], 42);
        assert_eq!(injected["6"]["inputs"]["noise_seed"], 42);
    }

    #[test]
    fn explicit_seed_keeps_full_64_bit_width() {
        let requested: i64 = 5_000_000_000;
        let injected = inject_params(&sample_workflow(), &json!({"seed": requested}));
        assert_eq!(injected["5"]["inputs"]["seed"], requested);
        assert_eq!(injected["6"]["inputs"]["noise_seed"], requested);
    }

    #[test]
    fn sentinel_seed_resolves_once_per_call() {
        let injected = inject_params(&sample_workflow(), &json!({"seed": -1}));
        let seed = injected["5"]["inputs"]["seed"]
            .as_u64()
            .expect("seed should be numeric");
        // Both samplers share the single resolved value.
        assert_eq!(injected["6"]["inputs"]["noise_seed"].as_u64(), Some(seed));
        assert!(seed <= u32::MAX as u64);
    }

    #[test]
    fn sampler_fields_are_overwritten() {
        let injected = inject_params(
            &sample_workflow(),
            &json!({"steps": 30, "cfg_scale": 4.5, "seed": 1}),
        );
        assert_eq!(injected["5"]["inputs"]["steps"], 30);
        assert_eq!(injected["5"]["inputs"]["cfg"], 4.5);
    }

    #[test]
    fn fps_applies_to_any_node_carrying_it() {
        let workflow = json!({
            "9": {
                "class_type": "ADE_AnimateDiffSamplerSettings",
                "inputs": {"fps": 8}
            }
        });
        let injected = inject_params(&workflow, &json!({"fps": 24, "seed": 1}));
        assert_eq!(injected["9"]["inputs"]["fps"], 24);
    }

    #[test]
    fn unrecognized_nodes_pass_through_with_params_present() {
        let injected = inject_params(
            &sample_workflow(),
            &json!({"prompt": "x", "steps": 5, "seed": 1}),
        );
        assert_eq!(
            injected["7"],
            json!({"class_type": "SaveImage", "inputs": {"filename_prefix": "out"}})
        );
    }
}
