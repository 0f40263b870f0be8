use super::*;
use futures::StreamExt;

#[tokio::test]
async fn test_stream_chunks_then_terminal() {
    let t = test_agent(vec![text_response("hello world")]).await;

    let stream = t
        .agent
        .clone()
        .chat_stream(ChatRequest::new("hi").with_streaming())
        .await
        .unwrap();
    let chunks: Vec<ChatResponse> = stream.collect().await;

    assert!(chunks.len() >= 2);
    let (partials, terminal) = chunks.split_at(chunks.len() - 1);
    for chunk in partials {
        assert!(!chunk.finished);
        assert!(!chunk.response.is_empty());
    }
    let combined: String = partials.iter().map(|c| c.response.as_str()).collect();
    assert_eq!(combined, "hello world");

    let terminal = &terminal[0];
    assert!(terminal.finished);
    assert!(terminal.response.is_empty());
    assert_eq!(terminal.usage.total_tokens, 30);
    assert!(terminal.metadata.is_none());

    // Same session id on every chunk
    assert!(chunks.iter().all(|c| c.session_id == chunks[0].session_id));
}

#[tokio::test]
async fn test_stream_with_tool_iteration() {
    let t = test_agent(vec![]).await;
    std::fs::write(t.workspace.join("f.txt"), "content\n").unwrap();
    let call = ToolCall::new(
        "t1",
        "read",
        format!("{{\"file_path\":\"{}\"}}", t.workspace.join("f.txt").display()),
    );
    *t.provider.responses.lock().unwrap() =
        VecDeque::from(vec![tool_response("reading", vec![call]), text_response("all done")]);

    let stream = t
        .agent
        .clone()
        .chat_stream(ChatRequest::new("read f").with_streaming())
        .await
        .unwrap();
    let chunks: Vec<ChatResponse> = stream.collect().await;

    let combined: String = chunks
        .iter()
        .filter(|c| !c.finished)
        .map(|c| c.response.as_str())
        .collect();
    // Text from both loop iterations streamed out
    assert!(combined.contains("reading"));
    assert!(combined.contains("all done"));

    let terminal = chunks.last().unwrap();
    assert!(terminal.finished);
    assert_eq!(terminal.usage.total_tokens, 60);

    // Both iterations persisted
    let state = t.agent.get_state(&terminal.session_id).await.unwrap();
    assert_eq!(state.messages.len(), 4);
    assert_eq!(state.status, AgentStatus::Done);
}

#[tokio::test]
async fn test_stream_upstream_error_in_terminal_chunk() {
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        async fn chat(&self, _request: LLMRequest) -> ProviderResult<LLMResponse> {
            Err(crate::provider::ProviderError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            })
        }

        async fn chat_stream(&self, request: LLMRequest) -> ProviderResult<ProviderStream> {
            self.chat(request).await?;
            unreachable!()
        }

        fn provider(&self) -> &str {
            "failing"
        }

        fn config(&self) -> ProviderRuntimeConfig {
            ProviderRuntimeConfig {
                model: "failing".to_string(),
                max_tokens: 4096,
                context_window: 100_000,
            }
        }
    }

    let t = test_agent(vec![]).await;
    // Swap in an agent whose provider always fails but reuse the rest
    let prompts_dir = tempfile::tempdir().unwrap();
    let storage_dir = tempfile::tempdir().unwrap();
    let prompts = Arc::new(
        crate::prompts::PromptManager::new(&PromptsConfig {
            directory: prompts_dir.path().to_path_buf(),
            hot_reload: false,
        })
        .unwrap(),
    );
    let storage = Arc::new(FileSessionStorage::new(storage_dir.path()).unwrap());
    let failing: Arc<dyn Provider> = Arc::new(FailingProvider);
    let context = Arc::new(
        ContextManager::new(
            storage,
            failing.clone(),
            prompts.clone(),
            6,
            0.9,
            Some(100_000),
            "notes.md".to_string(),
        )
        .await
        .unwrap(),
    );
    let tools_config = ToolsConfig::default();
    let registry = Arc::new(ToolRegistry::from_enabled(&tools_config.enabled_tools));
    let engine = Arc::new(ToolEngine::new(registry, &tools_config, t.workspace.clone()));
    let agent = Arc::new(
        Agent::new(failing, context, engine, prompts).with_working_directory(t.workspace.clone()),
    );

    let stream = agent
        .clone()
        .chat_stream(ChatRequest::new("hi").with_streaming())
        .await
        .unwrap();
    let chunks: Vec<ChatResponse> = stream.collect().await;

    let terminal = chunks.last().unwrap();
    assert!(terminal.finished);
    let error = terminal.metadata.as_ref().unwrap().get("error").unwrap();
    assert!(error.contains("upstream exploded"));

    // State reflects the failure
    let state = agent.get_state(&terminal.session_id).await.unwrap();
    assert_eq!(state.status, AgentStatus::Error);
    // The user message survived the failed turn
    assert_eq!(state.messages.len(), 1);
}
