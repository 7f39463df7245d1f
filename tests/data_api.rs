/// Integration tests for the data endpoints
///
/// These tests verify that:
/// - blocks resolve identically by height and by hash
/// - reorgs replace blocks atomically and orphaned blocks become unknown
/// - balances follow payouts through maturity
/// - network endpoints describe the indexed chain

mod common;

use anyhow::Result;
use common::{RosettaTestHarness, TestConfigBuilder, fixtures};
use rosetta_index::types::Address;
use serde_json::{Value, json};

async fn block(h: &RosettaTestHarness, which: Value) -> Result<(u16, Value)> {
    let (status, body) = h
        .post("/block", json!({ "network_identifier": h.network_identifier(), "block_identifier": which }))
        .await?;
    Ok((status.as_u16(), body))
}

#[tokio::test]
async fn test_block_by_height_and_hash_agree() -> Result<()> {
    let h = RosettaTestHarness::new()?;
    let a = fixtures::address_for(&fixtures::test_key(1));
    h.mine_blocks(4, a)?;

    let (status, by_height) = block(&h, json!({ "index": 3 })).await?;
    assert_eq!(status, 200);
    let hash = by_height["block"]["block_identifier"]["hash"].clone();
    let (_, by_hash) = block(&h, json!({ "hash": hash })).await?;
    assert_eq!(by_height, by_hash);
    assert_eq!(by_height["block"]["parent_block_identifier"]["index"], 2);

    let (_, tip) = block(&h, json!({})).await?;
    assert_eq!(tip["block"]["block_identifier"]["index"], 4);

    for index in [-1, 5] {
        let (status, err) = block(&h, json!({ "index": index })).await?;
        assert_eq!(status, 500);
        assert_eq!(err["code"], 7);
        assert_eq!(err["retriable"], true);
    }
    Ok(())
}

#[tokio::test]
async fn test_reorg_replaces_tip() -> Result<()> {
    let h = RosettaTestHarness::new()?;
    let x = fixtures::address_for(&fixtures::test_key(1));
    let y = fixtures::address_for(&fixtures::test_key(2));
    let chain_x = h.mine_blocks(5, x)?;

    let chain_y = h.simulate_reorg(3, &[y, y, y, y])?;
    assert_eq!(chain_y.len(), 4);

    let (_, tip) = block(&h, json!({})).await?;
    assert_eq!(tip["block"]["block_identifier"]["index"], 6);
    assert_eq!(tip["block"]["block_identifier"]["hash"], chain_y[3].id().to_string());

    for orphan in &chain_x[2..] {
        let (status, err) = block(&h, json!({ "hash": orphan.id().to_string() })).await?;
        assert_eq!(status, 500);
        assert_eq!(err["code"], 7);
    }
    let (_, kept) = block(&h, json!({ "index": 2 })).await?;
    assert_eq!(kept["block"]["block_identifier"]["hash"], chain_x[1].id().to_string());

    // only x's payouts from heights 1 and 2 survive; y's mature one behind the tip
    let balance = |addr: Address| {
        json!({
            "network_identifier": h.network_identifier(),
            "account_identifier": { "address": addr.to_string() },
        })
    };
    let bx = h.post_ok("/account/balance", balance(x)).await?;
    assert_eq!(bx["balances"][0]["value"], "200");
    let by = h.post_ok("/account/balance", balance(y)).await?;
    assert_eq!(by["balances"][0]["value"], "300");
    Ok(())
}

#[tokio::test]
async fn test_payout_balance_follows_maturity() -> Result<()> {
    let h = RosettaTestHarness::with_config(TestConfigBuilder::new().with_maturity_delay(3))?;
    let a = fixtures::address_for(&fixtures::test_key(1));
    let req = json!({
        "network_identifier": h.network_identifier(),
        "account_identifier": { "address": a.to_string() },
    });

    h.mine_blocks(1, a)?;
    let res = h.post_ok("/account/balance", req.clone()).await?;
    assert_eq!(res["balances"][0]["value"], "0");
    assert_eq!(res["balances"][0]["currency"]["symbol"], "SC");

    h.mine_blocks(2, Address::VOID)?;
    let res = h.post_ok("/account/balance", req.clone()).await?;
    assert_eq!(res["balances"][0]["value"], "0");

    h.mine_blocks(1, Address::VOID)?;
    let res = h.post_ok("/account/balance", req).await?;
    assert_eq!(res["balances"][0]["value"], "100");
    assert_eq!(res["metadata"]["utxos"][0]["timelock"], 4);
    assert_eq!(res["block_identifier"]["index"], 4);
    Ok(())
}

#[tokio::test]
async fn test_network_endpoints() -> Result<()> {
    let h = RosettaTestHarness::new()?;
    h.mine_blocks(2, Address::VOID)?;

    let list = h.post_ok("/network/list", json!({})).await?;
    assert_eq!(list["network_identifiers"], json!([h.network_identifier()]));

    let status = h
        .post_ok("/network/status", json!({ "network_identifier": h.network_identifier() }))
        .await?;
    assert_eq!(status["current_block_identifier"]["index"], 2);
    assert_eq!(status["genesis_block_identifier"]["index"], 0);
    assert_eq!(status["genesis_block_identifier"]["hash"], h.node.genesis_id().to_string());

    let options = h
        .post_ok("/network/options", json!({ "network_identifier": h.network_identifier() }))
        .await?;
    assert_eq!(options["allow"]["operation_types"], json!(["Debit", "Credit"]));
    assert_eq!(options["allow"]["historical_balance_lookup"], false);
    let codes: Vec<u64> = options["allow"]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["code"].as_u64().unwrap())
        .collect();
    assert_eq!(codes, (0..16).collect::<Vec<u64>>());
    assert_eq!(options["allow"]["errors"][15]["details"]["class"], "internal");
    Ok(())
}
