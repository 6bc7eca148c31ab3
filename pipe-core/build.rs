use anyhow::{Context, Result};

fn main() -> Result<()> {
    // Build the pipe.proto code, with every map generated as a `BTreeMap`.
    prost_build::Config::new()
        .out_dir("src/proto")
        .btree_map(&["."])
        .compile_protos(&["proto/pipe.proto"], &["proto"])
        .context("error compiling pipe proto")?;

    Ok(())
}
