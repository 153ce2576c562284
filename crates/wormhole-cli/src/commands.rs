//! `get` and `add`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::HumanBytes;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wormhole_dag::{Blockstore, ContentId, FlatfsStore};
use wormhole_retrieval::{
    candidates_for, parse_miners, retrieve_from_best_candidate, AttemptPlan, Candidate,
    CandidateDiscovery, GatewayClient, LocalNode, Network, RetrievalConfig, RetrievalStats,
    Result, Selector, SwarmAttempt,
};

use crate::progress::TerminalProgress;

/// Arguments of `wormhole get`.
pub struct GetArgs {
    pub cid: String,
    pub network: String,
    pub miners: Vec<String>,
    pub selector: Option<String>,
    pub no_sort: bool,
    pub output: Option<PathBuf>,
}

async fn open_node(config: &RetrievalConfig) -> Result<(Arc<LocalNode>, Arc<dyn Blockstore>)> {
    let store: Arc<dyn Blockstore> = Arc::new(FlatfsStore::open(config.blocks_dir()).await?);
    let node = LocalNode::new(config.peer_id(), vec![config.listen_addr], Arc::clone(&store));
    info!(peer = %node.id(), data_dir = %config.data_dir.display(), "opened local node");
    Ok((Arc::new(node), store))
}

/// Operator-supplied miners, or the discovery service when none were given.
async fn collect_candidates(
    config: &RetrievalConfig,
    cid: &ContentId,
    miners: &[String],
    network: Network,
) -> Result<Vec<Candidate>> {
    let miners = parse_miners(miners)?;
    if !miners.is_empty() {
        return Ok(candidates_for(miners, *cid));
    }

    let Some(endpoint) = config.discovery_endpoint.as_deref() else {
        return Ok(Vec::new());
    };
    if !network.uses_market() {
        return Ok(Vec::new());
    }

    let discovery = CandidateDiscovery::new(endpoint)?;
    match discovery.candidates(cid).await {
        Ok(candidates) => Ok(candidates),
        Err(e) => {
            warn!("failed to get retrieval candidates: {}", e);
            Ok(Vec::new())
        }
    }
}

pub async fn get(config: RetrievalConfig, args: GetArgs, cancel: CancellationToken) -> Result<()> {
    let cid: ContentId = args.cid.parse()?;
    let network: Network = args.network.parse()?;
    let selector = args.selector.as_deref().map(Selector::parse).transpose()?;

    let (node, store) = open_node(&config).await?;
    let candidates = collect_candidates(&config, &cid, &args.miners, network).await?;
    let market = Arc::new(
        GatewayClient::new(&config.market_api, store)?.with_query_timeout(config.query_timeout),
    );

    let swarm = SwarmAttempt::new(cid)
        .with_discovery_timeout(config.discovery_timeout)
        .with_concurrency(config.walk_concurrency);

    let attempts = AttemptPlan::new(cid, network, market)
        .with_selector(selector)
        .with_no_sort(args.no_sort)
        .with_query_timeout(config.query_timeout)
        .with_candidates(candidates)
        .with_swarm(swarm)
        .build()?;

    let progress = Arc::new(TerminalProgress::new());
    let result =
        retrieve_from_best_candidate(node.clone(), &cancel, &attempts, progress.clone()).await;
    progress.finish();
    let stats = result?;

    print_stats(&stats);

    let root = stats.root().unwrap_or(cid);
    if root != cid {
        info!(%root, "saving selected sub-graph");
    }

    let output = args.output.unwrap_or_else(|| PathBuf::from(cid.to_string()));
    save(&node, &root, &output).await?;
    println!("Saved output to {}", output.display());
    Ok(())
}

pub async fn add(config: RetrievalConfig, path: &Path) -> Result<()> {
    let data = tokio::fs::read(path).await?;
    let (node, _) = open_node(&config).await?;
    let cid = node.add(&data).await?;
    println!("{cid}");
    Ok(())
}

fn print_stats(stats: &RetrievalStats) {
    println!("Retrieval succeeded");
    println!(
        "  Bytes:    {} ({})",
        stats.byte_size(),
        HumanBytes(stats.byte_size())
    );
    println!("  Duration: {:.2?}", stats.duration());
    println!(
        "  Rate:     {}/s",
        HumanBytes(stats.average_bytes_per_second())
    );
}

/// Write the reassembled payload, replacing `output` only once it is complete.
async fn save(node: &LocalNode, root: &ContentId, output: &Path) -> Result<()> {
    let data = node.read(root).await?;
    let tmp = part_path(output);

    let written = async {
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, output).await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// `<output>.part`
fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use wormhole_dag::{Block, Codec, DagBuilder, DagNode};

    fn config(dir: &Path) -> RetrievalConfig {
        config_with_market(dir, "http://127.0.0.1:9")
    }

    fn config_with_market(dir: &Path, market_api: &str) -> RetrievalConfig {
        let dir = dir.to_string_lossy().into_owned();
        let market_api = market_api.to_string();
        RetrievalConfig::from_lookup(|key| match key {
            "WORMHOLE_DATA_DIR" => Some(dir.clone()),
            "WORMHOLE_MARKET_API" => Some(market_api.clone()),
            "WORMHOLE_LISTEN_ADDR" => Some("127.0.0.1:6746".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn get_args(cid: &ContentId, network: &str, output: &Path) -> GetArgs {
        GetArgs {
            cid: cid.to_string(),
            network: network.to_string(),
            miners: Vec::new(),
            selector: None,
            no_sort: false,
            output: Some(output.to_path_buf()),
        }
    }

    #[tokio::test]
    async fn add_then_get_over_swarm_in_fresh_process() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        let payload: Vec<u8> = (0..700_000u32).map(|i| (i % 253) as u8).collect();
        tokio::fs::write(&input, &payload).await.unwrap();

        let config = config(&dir.path().join("data"));
        add(config.clone(), &input).await.unwrap();
        let cid = DagBuilder::default().build(&payload).unwrap().root;

        let output = dir.path().join("out.bin");
        get(config, get_args(&cid, "ipfs", &output), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), payload);
        assert!(!part_path(&output).exists());
    }

    #[tokio::test]
    async fn get_with_selector_saves_selected_sub_graph() {
        let photo: Vec<u8> = (0..5000u32).map(|i| (i % 199) as u8).collect();
        let selected = DagBuilder::new(1024, 4).unwrap().build(&photo).unwrap();
        let sibling = ContentId::of(Codec::Raw, b"never transferred");
        let album = Block::encode(&DagNode::branch(vec![selected.root, sibling])).unwrap();

        let mut body = String::new();
        for block in &selected.blocks {
            body.push_str(&format!(
                "{{\"event\":\"block\",\"cid\":\"{}\",\"data\":\"{}\"}}\n",
                block.cid(),
                hex::encode(block.data())
            ));
        }
        body.push_str(&format!("{{\"event\":\"done\",\"root\":\"{}\"}}\n", selected.root));

        let app = Router::new()
            .route(
                "/query",
                post(|| async {
                    Json(serde_json::json!({
                        "status": "available",
                        "size": 5000,
                        "minPricePerByte": "1",
                        "unsealPrice": "0",
                        "paymentInterval": 1048576,
                        "paymentIntervalIncrease": 1048576,
                    }))
                }),
            )
            .route("/retrieve", post(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let config = config_with_market(&dir.path().join("data"), &format!("http://{addr}"));
        let output = dir.path().join("beach.jpg");
        let mut args = get_args(album.cid(), "fil", &output);
        args.miners = vec!["f01".to_string()];
        args.selector = Some("photos/beach.jpg".to_string());

        get(config, args, CancellationToken::new()).await.unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), photo);
    }

    #[test]
    fn part_path_keeps_extension() {
        assert_eq!(
            part_path(Path::new("/tmp/movie.mp4")),
            PathBuf::from("/tmp/movie.mp4.part")
        );
    }

    #[tokio::test]
    async fn failed_save_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let node = LocalNode::new(
            wormhole_retrieval::PeerId::from_public_key(b"save"),
            Vec::new(),
            Arc::new(wormhole_dag::MemoryStore::new()),
        );
        let cid = node.add(b"payload").await.unwrap();

        // Renaming a file over a non-empty directory fails.
        let output = dir.path().join("taken");
        tokio::fs::create_dir(&output).await.unwrap();
        tokio::fs::write(output.join("keep"), b"x").await.unwrap();

        assert!(save(&node, &cid, &output).await.is_err());
        assert!(!part_path(&output).exists());
    }

    #[tokio::test]
    async fn get_rejects_bad_network_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let args = GetArgs {
            cid: ContentId::of(Codec::Raw, b"x").to_string(),
            network: "carrier-pigeon".to_string(),
            miners: Vec::new(),
            selector: None,
            no_sort: false,
            output: None,
        };

        let err = get(config(&data), args, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, wormhole_retrieval::Error::UnknownNetwork(_)));
        assert!(!data.exists());
    }

    #[tokio::test]
    async fn get_with_bad_miner_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let args = GetArgs {
            cid: ContentId::of(Codec::Raw, b"x").to_string(),
            network: "fil".to_string(),
            miners: vec!["f01,nonsense".to_string()],
            selector: None,
            no_sort: false,
            output: Some(dir.path().join("never")),
        };

        let err = get(config(&dir.path().join("data")), args, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.class(), wormhole_retrieval::ErrorClass::Configuration);
        assert!(!dir.path().join("never").exists());
    }
}
