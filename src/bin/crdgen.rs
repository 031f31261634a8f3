// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! CRD YAML Generator
//!
//! Writes the `Database` CRD generated from `src/crd.rs` to `deploy/crds/`,
//! so the manifest never drifts from the Rust types.
//!
//! Usage:
//!   cargo run --bin crdgen

use anyhow::Result;
use expense_operator::crd::Database;
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2021 Nikolaj Majorov
# SPDX-License-Identifier: Apache-2.0
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<()> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML from src/crd.rs...");
    generate_crd::<Database>("databases.crd.yaml", output_dir)?;
    println!("Apply with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T: CustomResourceExt>(filename: &str, output_dir: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&T::crd())?;
    let output_path = output_dir.join(filename);
    fs::write(&output_path, format!("{COPYRIGHT_HEADER}{yaml}"))?;

    println!("  Generated {}", output_path.display());
    Ok(())
}
