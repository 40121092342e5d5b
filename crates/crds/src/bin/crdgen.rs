//! Prints the MongoDBCommunity CRD as YAML for `kubectl apply -f -`.

use anyhow::Context;
use crds::MongoDBCommunity;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&MongoDBCommunity::crd()).context("failed to serialize MongoDBCommunity CRD")?;
    print!("{yaml}");
    Ok(())
}
