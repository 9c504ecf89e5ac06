use anyhow::Context;

fn main() -> anyhow::Result<()> {
    lifescore::run().context("lifescore command failed")
}
