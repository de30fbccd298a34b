//! Validation functions for bundle manifests
//!
//! Structural checks run against a JSON Schema; referential checks (unique
//! names, dangling dependencies, assets pointing at unknown bundles) run
//! against the typed manifest afterwards.

use crate::error::{Error, Result};
use crate::{Manifest, MANIFEST_SCHEMA_VERSION};
use jsonschema::{ValidationError, Validator};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Validate a manifest's structure and internal references
pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    if manifest.schema != MANIFEST_SCHEMA_VERSION {
        return Err(Error::version_mismatch(
            MANIFEST_SCHEMA_VERSION,
            manifest.schema.as_str(),
        ));
    }

    let schema = get_manifest_schema();
    let compiled = Validator::new(&schema)
        .map_err(|e| Error::validation(format!("Failed to compile schema: {}", e)))?;

    let value = serde_json::to_value(manifest)?;

    if let Err(errors) = compiled.validate(&value) {
        let error_messages: Vec<String> = errors
            .map(|e| format_validation_error(&e))
            .collect();

        return Err(Error::validation(format!(
            "Manifest validation failed:\n  - {}",
            error_messages.join("\n  - ")
        )));
    }

    validate_references(manifest)
}

fn validate_references(manifest: &Manifest) -> Result<()> {
    let mut problems = Vec::new();

    let mut names = HashSet::new();
    for bundle in &manifest.bundles {
        if !names.insert(bundle.name.as_str()) {
            problems.push(format!("duplicate bundle '{}'", bundle.name));
        }
    }

    for bundle in &manifest.bundles {
        for dep in &bundle.dependencies {
            if !names.contains(dep.as_str()) {
                problems.push(format!(
                    "bundle '{}' depends on unknown bundle '{}'",
                    bundle.name, dep
                ));
            }
        }
    }

    let mut paths = HashSet::new();
    for asset in &manifest.assets {
        if !paths.insert(asset.path.as_str()) {
            problems.push(format!("duplicate asset path '{}'", asset.path));
        }
        if !names.contains(asset.bundle.as_str()) {
            problems.push(format!(
                "asset '{}' points to unknown bundle '{}'",
                asset.path, asset.bundle
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Manifest validation failed:\n  - {}",
            problems.join("\n  - ")
        )))
    }
}

/// Format a validation error into a readable string
fn format_validation_error(error: &ValidationError) -> String {
    format!("{}: {}", error.instance_path, error)
}

/// Get the manifest JSON Schema
fn get_manifest_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["schema", "package_name", "package_version", "bundles"],
        "properties": {
            "schema": {
                "type": "string",
                "const": "patchbay.manifest.v1"
            },
            "package_name": {
                "type": "string",
                "minLength": 1
            },
            "package_version": {
                "type": "string",
                "minLength": 1
            },
            "bundles": {
                "type": "array",
                "items": { "$ref": "#/$defs/bundle" }
            },
            "assets": {
                "type": "array",
                "items": { "$ref": "#/$defs/asset" }
            }
        },
        "$defs": {
            "bundle": {
                "type": "object",
                "required": ["name", "hash", "size"],
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "file_name": { "type": "string", "minLength": 1 },
                    "hash": { "type": "string", "pattern": "^[0-9a-fA-F]+$" },
                    "size": { "type": "integer", "minimum": 0 },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string", "minLength": 1 }
                    },
                    "dependencies": {
                        "type": "array",
                        "items": { "type": "string", "minLength": 1 }
                    }
                }
            },
            "asset": {
                "type": "object",
                "required": ["path", "bundle"],
                "properties": {
                    "path": { "type": "string", "minLength": 1 },
                    "bundle": { "type": "string", "minLength": 1 }
                }
            }
        }
    })
}
