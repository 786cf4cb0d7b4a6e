//! End-to-end tests for the query pipeline, driven entirely by the
//! simulated language-model and embedding services.

use std::sync::Arc;

use lodestone::index::keywords::SimpleKeywordExtractor;
use lodestone::query::QueryCombiner;
use lodestone::service::{SimulatedEmbedding, SimulatedLlm};
use lodestone::split::WhitespaceTokenizer;
use lodestone::{
    DocumentStore, EngineError, IndexBuilder, IndexKind, IndexSnapshot, IndexStruct,
    MultiStepOptions, Node, QueryConfig, QueryMode, QueryOrchestrator, ServiceContext,
    StepDecomposeTransform,
};

fn test_ctx() -> ServiceContext {
    ServiceContext::new(
        Arc::new(SimulatedLlm::new()),
        Arc::new(SimulatedEmbedding::default()),
        Arc::new(WhitespaceTokenizer),
    )
}

/// Scenario A: one document of exactly one sentence, vector index, K=1,
/// query identical to the sentence.
#[tokio::test]
async fn test_vector_query_returns_exact_match_as_sole_source() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();

    let sentence = "The author grew up writing short stories.";
    let index = builder
        .build_vector(vec![Node::with_id("s1", sentence)], &mut docstore)
        .await?;

    let orchestrator = QueryOrchestrator::new(index, docstore, ctx).with_configs(vec![
        QueryConfig::new(IndexKind::VectorDict, QueryMode::Default).with_similarity_top_k(1),
    ]);

    let response = orchestrator.query(sentence).await?;
    assert_eq!(response.source_nodes.len(), 1);
    assert_eq!(response.source_nodes[0].node.id, "s1");
    let score = response.source_nodes[0].score.unwrap();
    assert!((score - 1.0).abs() < 1e-5, "expected cosine 1.0, got {score}");
    Ok(())
}

#[tokio::test]
async fn test_vector_top_k_is_ranked_and_stable() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();

    let nodes = vec![
        Node::with_id("a", "growing up in a small town"),
        Node::with_id("b", "company founding and early hires"),
        Node::with_id("c", "a third unrelated passage"),
    ];
    let index = builder.build_vector(nodes, &mut docstore).await?;
    let orchestrator = QueryOrchestrator::new(index, docstore, ctx).with_configs(vec![
        QueryConfig::new(IndexKind::VectorDict, QueryMode::Default).with_similarity_top_k(3),
    ]);

    let first = orchestrator.query("growing up in a small town").await?;
    let second = orchestrator.query("growing up in a small town").await?;

    let ids = |r: &lodestone::Response| -> Vec<String> {
        r.source_nodes.iter().map(|s| s.node.id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first.source_nodes[0].node.id, "a");
    for pair in first.source_nodes.windows(2) {
        assert!(pair[0].score.unwrap() >= pair[1].score.unwrap());
    }
    Ok(())
}

/// Scenario B: keyword-table index; only the node sharing a query keyword
/// comes back.
#[tokio::test]
async fn test_keyword_query_matches_only_keyword_overlap() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();
    let extractor = SimpleKeywordExtractor::default();

    let nodes = vec![
        Node::with_id("n1", "growing up, the author wrote essays"),
        Node::with_id("n2", "company founding came years later"),
    ];
    let index = builder
        .build_keyword_table(nodes, &mut docstore, &extractor)
        .await?;

    // Default mode routes keyword extraction through the (simulated) LLM.
    let orchestrator = QueryOrchestrator::new(index, docstore, ctx);
    let response = orchestrator
        .query("What did the author do growing up?")
        .await?;

    assert_eq!(response.source_nodes.len(), 1);
    assert_eq!(response.source_nodes[0].node.id, "n1");
    Ok(())
}

#[tokio::test]
async fn test_keyword_query_simple_mode() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();
    let extractor = SimpleKeywordExtractor::default();

    let nodes = vec![
        Node::with_id("n1", "growing up, the author wrote essays"),
        Node::with_id("n2", "company founding came years later"),
    ];
    let index = builder
        .build_keyword_table(nodes, &mut docstore, &extractor)
        .await?;

    let orchestrator = QueryOrchestrator::new(index, docstore, ctx).with_configs(vec![
        QueryConfig::new(IndexKind::KeywordTable, QueryMode::Simple),
    ]);
    let response = orchestrator
        .query("What did the author do growing up?")
        .await?;

    assert_eq!(response.source_nodes.len(), 1);
    assert_eq!(response.source_nodes[0].node.id, "n1");
    Ok(())
}

/// Scenario C: multi-step with one step and early stopping disabled records
/// exactly one sub-question/sub-answer pair.
#[tokio::test]
async fn test_multi_step_records_single_round() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();

    let mut index = builder.build_list(
        vec![Node::with_id("n1", "the author grew up writing")],
        &mut docstore,
    )?;
    index.set_summary("an essay about the author's life");

    let llm = ctx.llm.clone();
    let orchestrator = QueryOrchestrator::new(index, docstore, ctx)
        .with_transform(Arc::new(StepDecomposeTransform::new(llm)))
        .with_combiner(QueryCombiner::MultiStep(MultiStepOptions {
            num_steps: Some(1),
            early_stopping: false,
        }));

    let response = orchestrator.query("What did the author do?").await?;
    assert_eq!(response.sub_qa.len(), 1);
    assert_eq!(response.sub_qa[0].question, "What did the author do?");
    assert!(!response.sub_qa[0].answer.is_empty());
    assert!(response.response.is_some());
    assert_eq!(response.source_nodes.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_multi_step_requires_index_summary() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();
    let index = builder.build_list(vec![Node::with_id("n1", "text")], &mut docstore)?;

    let llm = ctx.llm.clone();
    let orchestrator = QueryOrchestrator::new(index, docstore, ctx)
        .with_transform(Arc::new(StepDecomposeTransform::new(llm)))
        .with_combiner(QueryCombiner::MultiStep(MultiStepOptions::default()));

    let err = orchestrator.query("anything").await.unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    Ok(())
}

/// Scenario D: duplicate document ids without overwrite permission are a
/// validation error; with permission the content hash is overwritten.
#[test]
fn test_duplicate_insert_respects_allow_update() {
    let mut docstore = DocumentStore::new();
    docstore
        .add_nodes(vec![Node::with_id("d1", "first")], false)
        .unwrap();

    let err = docstore
        .add_nodes(vec![Node::with_id("d1", "second")], false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let before = docstore.hash_of("d1").unwrap().to_string();
    docstore
        .add_nodes(vec![Node::with_id("d1", "second")], true)
        .unwrap();
    assert_ne!(docstore.hash_of("d1").unwrap(), before);
}

/// Scenario E: composite graph query against a non-existent member id fails
/// before any retrieval happens.
#[tokio::test]
async fn test_composite_unknown_member_fails_before_retrieval() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();

    let member = builder.build_vector(
        vec![Node::with_id("n1", "member content")],
        &mut docstore,
    )
    .await?;
    let root_id = member.index_id().to_string();
    let composite = builder.build_composite(vec![member], &root_id)?;

    let embed = ctx.embed.clone();
    let orchestrator = QueryOrchestrator::new(composite, docstore, ctx);

    let embed_tokens_before = embed.total_tokens_used();
    let err = orchestrator
        .query_index("anything", "no-such-index")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DataIntegrity(_)));
    // No retrieval ran: the embedding service was never called.
    assert_eq!(embed.total_tokens_used(), embed_tokens_before);
    Ok(())
}

#[tokio::test]
async fn test_composite_recursive_query_carries_nested_sources() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();

    let nested = builder.build_list(
        vec![Node::with_id("leaf", "deep nested detail")],
        &mut docstore,
    )?;
    let nested_id = nested.index_id().to_string();

    let root = builder.build_list(
        vec![
            Node::with_id("root-text", "top level context"),
            Node::index_ref("summary of the nested index", &nested_id),
        ],
        &mut docstore,
    )?;
    let root_id = root.index_id().to_string();

    let composite = builder.build_composite(vec![root, nested], &root_id)?;
    let orchestrator = QueryOrchestrator::new(composite, docstore, ctx).recursive(true);

    let response = orchestrator.query("what is known?").await?;
    assert!(response.response.is_some());

    // Directly consumed sources first (the root text node plus the synthetic
    // node standing in for the nested answer), then the nested query's own
    // source appended.
    assert_eq!(response.source_nodes.len(), 3);
    assert_eq!(response.source_nodes[0].node.id, "root-text");
    assert_eq!(response.source_nodes[2].node.id, "leaf");
    Ok(())
}

#[tokio::test]
async fn test_insert_delete_refresh_maintenance() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();
    let index = builder.build_list(vec![Node::with_id("d1", "first doc")], &mut docstore)?;

    let mut orchestrator = QueryOrchestrator::new(index, docstore, ctx);

    orchestrator.insert(vec![Node::with_id("d2", "second doc")]).await?;
    let response = orchestrator.query("list everything").await?;
    assert_eq!(response.source_nodes.len(), 2);

    // Unchanged doc is skipped; changed doc is re-inserted.
    let flags = orchestrator
        .refresh(vec![
            Node::with_id("d1", "first doc"),
            Node::with_id("d2", "second doc, revised"),
        ])
        .await?;
    assert_eq!(flags, vec![false, true]);
    assert_eq!(orchestrator.docstore().get("d2")?.text, "second doc, revised");

    orchestrator.delete("d1")?;
    let response = orchestrator.query("list everything").await?;
    assert_eq!(response.source_nodes.len(), 1);
    assert_eq!(response.source_nodes[0].node.id, "d2");
    Ok(())
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_query_behavior() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();
    let sentence = "a single memorable sentence";
    let index = builder
        .build_vector(vec![Node::with_id("s1", sentence)], &mut docstore)
        .await?;

    let orchestrator = QueryOrchestrator::new(index, docstore, ctx.clone());
    let json = orchestrator.snapshot().to_json()?;

    let restored = IndexSnapshot::from_json(&json)?;
    assert!(matches!(restored.index_struct, IndexStruct::VectorDict(_)));
    let restored_orchestrator =
        QueryOrchestrator::new(restored.index_struct, restored.docstore, ctx);

    let response = restored_orchestrator.query(sentence).await?;
    assert_eq!(response.source_nodes.len(), 1);
    assert_eq!(response.source_nodes[0].node.id, "s1");
    Ok(())
}

#[tokio::test]
async fn test_empty_index_yields_empty_response_placeholder() -> anyhow::Result<()> {
    let ctx = test_ctx();
    let builder = IndexBuilder::new(ctx.clone());
    let mut docstore = DocumentStore::new();
    let index = builder.build_list(vec![], &mut docstore)?;

    let orchestrator = QueryOrchestrator::new(index, docstore, ctx);
    let response = orchestrator.query("anything at all").await?;
    assert_eq!(response.response.as_deref(), Some("Empty Response"));
    assert!(response.source_nodes.is_empty());
    Ok(())
}
