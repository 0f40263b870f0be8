use super::*;
use uuid::Uuid;

#[tokio::test]
async fn test_single_turn_no_tools() {
    let t = test_agent(vec![text_response("hello")]).await;

    let response = t.agent.chat(ChatRequest::new("hi")).await.unwrap();

    assert_eq!(response.response, "hello");
    assert!(response.finished);
    assert_eq!(response.usage.total_tokens, 30);
    // Server-assigned hyphenated lowercase UUID
    let session_id = Uuid::parse_str(&response.session_id).unwrap();
    assert_eq!(response.session_id, session_id.to_string());

    let state = t.agent.get_state(&response.session_id).await.unwrap();
    assert_eq!(state.status, AgentStatus::Done);
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].role, crate::message::Role::User);
    assert_eq!(state.messages[0].content, "hi");
    assert_eq!(state.messages[1].role, crate::message::Role::Assistant);
    assert_eq!(state.messages[1].content, "hello");
}

#[tokio::test]
async fn test_request_composition() {
    let t = test_agent(vec![text_response("ok")]).await;
    t.agent.chat(ChatRequest::new("hi")).await.unwrap();

    let requests = t.provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    // [system, user_info, history...]
    assert_eq!(messages[0].role, crate::message::Role::System);
    assert!(messages[0].content.contains("scripted"), "system prompt names the provider");
    assert_eq!(messages[1].role, crate::message::Role::System);
    assert!(messages[1].content.contains(&t.workspace.display().to_string()));
    assert_eq!(messages.last().unwrap().content, "hi");
    // All enabled tools attached
    assert_eq!(requests[0].tools.len(), 12);
}

#[tokio::test]
async fn test_tool_call_roundtrip() {
    let t = test_agent(vec![]).await;
    std::fs::write(t.workspace.join("x"), "a\n").unwrap();

    let call = ToolCall::new(
        "t1",
        "read",
        format!("{{\"file_path\":\"{}\"}}", t.workspace.join("x").display()),
    );
    *t.provider.responses.lock().unwrap() = VecDeque::from(vec![
        tool_response("let me read that", vec![call]),
        text_response("the file has one line"),
    ]);

    let response = t.agent.chat(ChatRequest::new("what's in x?")).await.unwrap();
    assert_eq!(response.response, "the file has one line");
    // Usage accumulated over both iterations
    assert_eq!(response.usage.total_tokens, 60);

    let state = t.agent.get_state(&response.session_id).await.unwrap();
    let roles: Vec<_> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            crate::message::Role::User,
            crate::message::Role::Assistant,
            crate::message::Role::Tool,
            crate::message::Role::Assistant,
        ]
    );

    let assistant = &state.messages[1];
    assert_eq!(assistant.tool_calls.len(), 1);
    assert_eq!(assistant.tool_calls[0].id, "t1");

    let tool_msg = &state.messages[2];
    assert_eq!(tool_msg.metadata.get("tool_call_id").map(String::as_str), Some("t1"));
    assert_eq!(tool_msg.metadata.get("tool_name").map(String::as_str), Some("read"));
    assert_eq!(tool_msg.metadata.get("success").map(String::as_str), Some("true"));
    assert!(tool_msg.content.contains("Tool: read"));
    assert!(tool_msg.content.contains("Success: true"));
    assert!(tool_msg.content.contains("     1→a"));

    // Second request carried the tool result back to the model
    let requests = t.provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.role, crate::message::Role::Tool);
}

#[tokio::test]
async fn test_unknown_tool_fed_back_not_fatal() {
    let t = test_agent(vec![
        tool_response("using a tool", vec![ToolCall::new("t1", "teleport", "{}")]),
        text_response("recovered"),
    ])
    .await;

    let response = t.agent.chat(ChatRequest::new("go")).await.unwrap();
    assert_eq!(response.response, "recovered");

    let state = t.agent.get_state(&response.session_id).await.unwrap();
    let tool_msg = state
        .messages
        .iter()
        .find(|m| m.role == crate::message::Role::Tool)
        .unwrap();
    assert!(tool_msg.content.contains("Success: false"));
    assert!(tool_msg.content.contains("tool teleport not found"));
    assert_eq!(tool_msg.metadata.get("success").map(String::as_str), Some("false"));
}

#[tokio::test]
async fn test_session_reuse_keeps_history() {
    let t = test_agent(vec![text_response("first"), text_response("second")]).await;

    let first = t.agent.chat(ChatRequest::new("one")).await.unwrap();
    let second = t
        .agent
        .chat(ChatRequest::new("two").with_session_id(first.session_id.clone()))
        .await
        .unwrap();
    assert_eq!(first.session_id, second.session_id);

    let state = t.agent.get_state(&second.session_id).await.unwrap();
    assert_eq!(state.messages.len(), 4);

    // The second request saw the first exchange
    let requests = t.provider.requests.lock().unwrap();
    let contents: Vec<&str> = requests[1].messages.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"one"));
    assert!(contents.contains(&"first"));
    assert!(contents.contains(&"two"));
}

#[tokio::test]
async fn test_invalid_session_id_rejected() {
    let t = test_agent(vec![]).await;
    let result = t
        .agent
        .chat(ChatRequest::new("hi").with_session_id("not-a-uuid"))
        .await;
    assert!(matches!(result, Err(AgentError::InvalidSessionId(_))));
}

#[tokio::test]
async fn test_max_loops_zero_is_empty_success() {
    let t = test_agent(vec![text_response("never sent")]).await;
    let agent = Arc::try_unwrap(t.agent).ok().unwrap().with_max_loops(0);

    let response = agent.chat(ChatRequest::new("hi")).await.unwrap();
    assert!(response.finished);
    assert!(response.response.is_empty());
    assert_eq!(t.provider.call_count(), 0);
}

#[tokio::test]
async fn test_loop_exhaustion_returns_last_content() {
    // Every response asks for another tool call; the cap must cut it off
    let responses: Vec<LLMResponse> = (0..5)
        .map(|i| {
            tool_response(
                &format!("attempt {i}"),
                vec![ToolCall::new(format!("t{i}"), "ls", "{}")],
            )
        })
        .collect();
    let t = test_agent(responses).await;
    let agent = Arc::try_unwrap(t.agent).ok().unwrap().with_max_loops(2);

    let response = agent.chat(ChatRequest::new("loop forever")).await.unwrap();
    assert!(response.finished);
    assert_eq!(response.response, "attempt 1");
    assert_eq!(
        response
            .metadata
            .as_ref()
            .and_then(|m| m.get("loop_exhausted"))
            .map(String::as_str),
        Some("true")
    );
    assert_eq!(t.provider.call_count(), 2);
}

#[tokio::test]
async fn test_get_state_unknown_session() {
    let t = test_agent(vec![]).await;
    let missing = Uuid::new_v4().to_string();
    assert!(matches!(
        t.agent.get_state(&missing).await,
        Err(AgentError::NotFound(_))
    ));
    assert!(matches!(
        t.agent.get_state("garbage").await,
        Err(AgentError::InvalidSessionId(_))
    ));
}
