//! End-to-end handoff behaviour with a scripted model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessageContent, CreateChatCompletionRequest,
};
use serde_json::json;

use advanced_handoff::assistants::{helpful_assistant, HELPFUL_ASSISTANT, MATH_TEACHER, MATH_TEACHER_TOOL};
use advanced_handoff::filters::is_tool_record;
use advanced_handoff::handoff::observer_fn;
use advanced_handoff::policy::policy_fn;
use advanced_handoff::{
    AgentDefinition, AgentsError, FnProvider, Handoff, HandoffEvent, HandoffObserver, HandoffStage,
    ProviderResponse, RunConfig, RunContext, Runner,
};

type RequestLog = Arc<Mutex<Vec<CreateChatCompletionRequest>>>;

/// How the top-level agent's scripted model behaves on its first turn.
#[derive(Clone, Copy)]
enum Opening {
    /// Call the handoff if it is offered, otherwise answer directly.
    HandoffIfOffered(&'static str),
    /// Call the handoff even when it is not offered.
    AlwaysHandoff,
    /// Call `weather` and the handoff in the same reply.
    WeatherThenHandoff,
    /// Call the handoff twice in the same reply.
    DoubleHandoff,
}

fn system_text(req: &CreateChatCompletionRequest) -> String {
    match req.messages.first() {
        Some(ChatCompletionRequestMessage::System(s)) => match &s.content {
            ChatCompletionRequestSystemMessageContent::Text(t) => t.clone(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

fn offers(req: &CreateChatCompletionRequest, name: &str) -> bool {
    req.tools
        .as_ref()
        .is_some_and(|tools| tools.iter().any(|t| t.function.name == name))
}

fn last_tool_output(req: &CreateChatCompletionRequest) -> Option<String> {
    match req.messages.last() {
        Some(ChatCompletionRequestMessage::Tool(t)) => match &t.content {
            ChatCompletionRequestToolMessageContent::Text(txt) => Some(txt.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn has_tool_messages(req: &CreateChatCompletionRequest) -> bool {
    req.messages
        .iter()
        .any(|m| matches!(m, ChatCompletionRequestMessage::Tool(_)))
}

fn math_model(opening: Opening, log: RequestLog) -> FnProvider {
    FnProvider::new(move |req| {
        log.lock().unwrap().push(req.clone());

        if system_text(req).contains("math teacher agent") {
            return Ok(match last_tool_output(req) {
                Some(sum) => ProviderResponse::text(format!("2 + 10 = {}", sum)),
                None => ProviderResponse::tool_call("add_1", "add", json!({"a": 2, "b": 10})),
            });
        }

        if has_tool_messages(req) {
            return Ok(ProviderResponse::text("I answered directly: 2 + 10 = 12"));
        }

        let reason = json!({"reason": "The user asked an arithmetic question."}).to_string();
        Ok(match opening {
            Opening::HandoffIfOffered(args) if offers(req, MATH_TEACHER_TOOL) => {
                ProviderResponse::tool_calls(vec![(
                    "h1".into(),
                    MATH_TEACHER_TOOL.into(),
                    args.into(),
                )])
            }
            Opening::HandoffIfOffered(_) => {
                ProviderResponse::text("I cannot delegate this, but 2 + 10 = 12.")
            }
            Opening::AlwaysHandoff => ProviderResponse::tool_calls(vec![(
                "h1".into(),
                MATH_TEACHER_TOOL.into(),
                reason,
            )]),
            Opening::WeatherThenHandoff => ProviderResponse::tool_calls(vec![
                ("w1".into(), "weather".into(), json!({"city": "karachi"}).to_string()),
                ("h1".into(), MATH_TEACHER_TOOL.into(), reason),
            ]),
            Opening::DoubleHandoff => ProviderResponse::tool_calls(vec![
                ("h1".into(), MATH_TEACHER_TOOL.into(), reason.clone()),
                ("h2".into(), MATH_TEACHER_TOOL.into(), reason),
            ]),
        })
    })
}

const VALID_ARGS: &str = r#"{"reason":"The user asked an arithmetic question."}"#;

struct Harness {
    runner: Runner,
    agent: Arc<AgentDefinition>,
    requests: RequestLog,
    events: Arc<Mutex<Vec<HandoffEvent>>>,
}

fn harness_with_observer(opening: Opening, observer: Option<Arc<dyn HandoffObserver>>) -> Harness {
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let observer: Arc<dyn HandoffObserver> = match observer {
        Some(observer) => observer,
        None => Arc::new(observer_fn(move |e: &HandoffEvent| {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        })),
    };
    let agent = Arc::new(helpful_assistant(None, observer).unwrap());
    let runner = Runner::new(math_model(opening, requests.clone()), RunConfig::default());
    Harness {
        runner,
        agent,
        requests,
        events,
    }
}

fn harness(opening: Opening) -> Harness {
    harness_with_observer(opening, None)
}

#[tokio::test]
async fn adult_is_handed_to_math_teacher() {
    let h = harness(Opening::HandoffIfOffered(VALID_ARGS));
    let ctx = RunContext::from_value(json!({"name": "Areeba Hammad", "age": 20, "role": "student"})).unwrap();

    let result = h.runner.run(h.agent.clone(), "What is 2+10?", ctx).await.unwrap();

    assert_eq!(result.last_agent_name(), MATH_TEACHER);
    assert_eq!(result.final_output, "2 + 10 = 12");
    assert_eq!(result.handoffs.len(), 1);
    assert_eq!(result.handoffs[0].from_agent, HELPFUL_ASSISTANT);
    assert_eq!(result.handoffs[0].to_agent, MATH_TEACHER);
    assert_eq!(result.handoffs[0].reason, "The user asked an arithmetic question.");
    assert!(result.rejections.is_empty());

    let events = h.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].context.age, Some(20));
    assert_eq!(events[0].tool_name, MATH_TEACHER_TOOL);
    assert_eq!(events[0].run_id, result.run_id);

    let requests = h.requests.lock().unwrap();
    assert!(offers(&requests[0], MATH_TEACHER_TOOL));
    assert!(offers(&requests[0], "weather"));
}

#[tokio::test]
async fn math_teacher_sees_no_tool_records() {
    let h = harness(Opening::WeatherThenHandoff);
    let result = h
        .runner
        .run(h.agent.clone(), "What is the weather in karachi? and 2+10=?", RunContext::new().with_age(20))
        .await
        .unwrap();
    assert_eq!(result.last_agent_name(), MATH_TEACHER);

    let requests = h.requests.lock().unwrap();
    let first_math = requests
        .iter()
        .find(|r| system_text(r).contains("math teacher agent"))
        .expect("math teacher was called");
    // System prompt + the original user question only.
    assert_eq!(first_math.messages.len(), 2);
    assert!(first_math.messages.iter().all(|m| !is_tool_record(m)));
    assert!(matches!(first_math.messages[1], ChatCompletionRequestMessage::User(_)));
    assert!(offers(first_math, "add"));
    assert!(!offers(first_math, "weather"));
}

#[tokio::test]
async fn minor_is_never_offered_the_handoff() {
    let h = harness(Opening::HandoffIfOffered(VALID_ARGS));
    let result = h
        .runner
        .run(h.agent.clone(), "What is 2+10?", RunContext::new().with_age(10))
        .await
        .unwrap();

    assert_eq!(result.last_agent_name(), HELPFUL_ASSISTANT);
    assert!(result.final_output.contains("12"));
    assert!(result.handoffs.is_empty());
    assert!(h.events.lock().unwrap().is_empty());
    assert!(h
        .requests
        .lock()
        .unwrap()
        .iter()
        .all(|r| !offers(r, MATH_TEACHER_TOOL)));
}

#[tokio::test]
async fn missing_age_fails_closed() {
    let h = harness(Opening::HandoffIfOffered(VALID_ARGS));
    let ctx = RunContext::from_value(json!({"name": "X"})).unwrap();
    let result = h.runner.run(h.agent.clone(), "What is 2+10?", ctx).await.unwrap();

    assert_eq!(result.last_agent_name(), HELPFUL_ASSISTANT);
    assert!(h.events.lock().unwrap().is_empty());
    assert!(h
        .requests
        .lock()
        .unwrap()
        .iter()
        .all(|r| !offers(r, MATH_TEACHER_TOOL)));
}

#[tokio::test]
async fn malformed_payload_aborts_only_the_handoff() {
    let h = harness(Opening::HandoffIfOffered("{}"));
    let result = h
        .runner
        .run(h.agent.clone(), "What is 2+10?", RunContext::new().with_age(20))
        .await
        .unwrap();

    assert_eq!(result.last_agent_name(), HELPFUL_ASSISTANT);
    assert_eq!(result.final_output, "I answered directly: 2 + 10 = 12");
    assert!(result.handoffs.is_empty());
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections[0].stage, HandoffStage::Validated);
    assert!(result.rejections[0].error.contains("reason"));
    assert!(h.events.lock().unwrap().is_empty());

    // The model was told why its handoff failed.
    let requests = h.requests.lock().unwrap();
    let feedback = last_tool_output(&requests[1]).unwrap();
    assert!(feedback.contains("Invalid input for handoff"));
}

#[tokio::test]
async fn unoffered_handoff_call_is_rejected() {
    let h = harness(Opening::AlwaysHandoff);
    let result = h
        .runner
        .run(h.agent.clone(), "What is 2+10?", RunContext::new().with_age(15))
        .await
        .unwrap();

    assert_eq!(result.last_agent_name(), HELPFUL_ASSISTANT);
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections[0].stage, HandoffStage::Offered);
    assert!(h.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn only_the_first_handoff_in_a_reply_runs() {
    let h = harness(Opening::DoubleHandoff);
    let result = h
        .runner
        .run(h.agent.clone(), "What is 2+10?", RunContext::new().with_age(30))
        .await
        .unwrap();

    assert_eq!(result.last_agent_name(), MATH_TEACHER);
    assert_eq!(result.handoffs.len(), 1);
    assert_eq!(h.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failing_observer_does_not_block_delegation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let observer: Arc<dyn HandoffObserver> = Arc::new(observer_fn(move |_e: &HandoffEvent| {
        seen.fetch_add(1, Ordering::SeqCst);
        Err(AgentsError::ObserverError {
            message: "audit sink unavailable".into(),
        })
    }));
    let h = harness_with_observer(Opening::HandoffIfOffered(VALID_ARGS), Some(observer));
    let result = h
        .runner
        .run(h.agent.clone(), "What is 2+10?", RunContext::new().with_age(20))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.last_agent_name(), MATH_TEACHER);
    assert_eq!(result.final_output, "2 + 10 = 12");
}

#[tokio::test]
async fn handoff_disabled_between_offer_and_delegation_is_rejected() {
    // Enabled when offered, disabled by the time the selection is re-checked.
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let flipping = policy_fn(move |_ctx, _agent| Ok(counter.fetch_add(1, Ordering::SeqCst) == 0));

    let notified = Arc::new(AtomicUsize::new(0));
    let seen = notified.clone();
    let sub = AgentDefinition::builder("Sub")
        .instructions("sub agent")
        .build()
        .unwrap();
    let top = Arc::new(
        AgentDefinition::builder("Top")
            .instructions("top agent")
            .handoff(
                Handoff::new(sub)
                    .with_tool_name("go")
                    .with_is_enabled(flipping)
                    .with_on_handoff(observer_fn(move |_e: &HandoffEvent| {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })),
            )
            .build()
            .unwrap(),
    );

    let provider = FnProvider::new(|req| {
        if has_tool_messages(req) {
            Ok(ProviderResponse::text("staying here"))
        } else {
            Ok(ProviderResponse::tool_call("g1", "go", json!({"reason": "delegate"})))
        }
    });
    let result = Runner::new(provider, RunConfig::default())
        .run(top, "hi", RunContext::new())
        .await
        .unwrap();

    assert_eq!(result.last_agent_name(), "Top");
    assert_eq!(result.final_output, "staying here");
    assert!(result.handoffs.is_empty());
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections[0].stage, HandoffStage::EnabledChecked);
    assert_eq!(result.rejections[0].tool_name, "go");
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert!(evaluations.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_share_definitions() {
    let h = harness(Opening::HandoffIfOffered(VALID_ARGS));

    let adult = {
        let runner = h.runner.clone();
        let agent = h.agent.clone();
        tokio::spawn(async move {
            runner
                .run(agent, "What is 2+10?", RunContext::new().with_age(20))
                .await
        })
    };
    let minor = {
        let runner = h.runner.clone();
        let agent = h.agent.clone();
        tokio::spawn(async move {
            runner
                .run(agent, "What is 2+10?", RunContext::new().with_age(10))
                .await
        })
    };

    let adult = adult.await.unwrap().unwrap();
    let minor = minor.await.unwrap().unwrap();
    assert_eq!(adult.last_agent_name(), MATH_TEACHER);
    assert_eq!(minor.last_agent_name(), HELPFUL_ASSISTANT);
    assert_eq!(h.events.lock().unwrap().len(), 1);
}
