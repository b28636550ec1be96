use anyhow::Result;
use chaingate_core::{
    auth,
    config::ChainRpcGroup,
    directory::ChainDirectory,
};

/// Queries the chain directory and emits the `[{chainID, rpc:[…]}]` JSON
/// shape accepted by the gateway's `rpcs` / `fallbacks` settings.
pub async fn fetch_endpoints(
    directory_url: &str,
    chain_ids: &[u64],
    output: Option<&str>,
) -> Result<()> {
    let directory = ChainDirectory::new(directory_url)?;
    let snapshot = directory.snapshot().await?;

    let mut groups: Vec<ChainRpcGroup> = snapshot
        .into_iter()
        .filter(|(chain_id, _)| chain_ids.is_empty() || chain_ids.contains(chain_id))
        .map(|(chain_id, rpc)| ChainRpcGroup { chain_id, rpc })
        .collect();
    groups.sort_by_key(|group| group.chain_id);

    let json = serde_json::to_string_pretty(&groups)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)?;
            println!("wrote {} chains to {path}", groups.len());
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Writes a fresh API key file.
pub fn keygen(output: &str) -> Result<()> {
    let keys = auth::generate_and_store(output)?;
    println!("wrote {} keys to {output}", keys.len());
    Ok(())
}
