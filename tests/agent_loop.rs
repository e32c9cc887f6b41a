//! Loop and executor behaviour against the in-memory browser.

mod common;

use common::*;
use eoka_vision::{Agent, CaptureOptions, Error, Executor, LoadState, SettleDelays};
use serde_json::json;

#[tokio::test]
async fn test_information_then_done_returns_log() {
    let driver = FakeDriver::new().with_page(
        "https://example.com",
        elements(&[("a", "More information...", 20.0, 60.0, 120.0, 18.0)]),
    );
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "information", "text": "Example Domain"})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(driver), oracle, fast_config());

    let info = agent
        .run(&task("go to example.com and log the page title", "https://example.com"))
        .await
        .unwrap();

    assert_eq!(info, vec!["Example Domain".to_string()]);
    assert!(agent.history().is_empty());
    assert_eq!(agent.steps(), 2);

    let driver = agent.executor().driver();
    assert_eq!(
        driver.events,
        vec![Event::Launch, Event::Goto("https://example.com".into())]
    );
    // The information step reuses the observation it was decided on.
    assert_eq!(driver.captures, 1);

    let prompts = &agent.oracle().prompts;
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("## previously browsed information\nnone"));
    assert!(prompts[1].contains("## previously browsed information\nExample Domain"));
}

#[tokio::test]
async fn test_out_of_range_click_falls_back_to_pointer() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "click", "element": 999})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    agent.run(&task("press the missing button", START_URL)).await.unwrap();

    assert_eq!(agent.executor().driver().clicks(), vec![(0.0, 0.0)]);
    assert_eq!(agent.history().len(), 1);
    assert_eq!(agent.executor().elements().len(), 3);
}

#[tokio::test]
async fn test_negative_index_falls_back_to_last_pointer() {
    let mut exec = executor(three_element_page());
    exec.navigate(START_URL).await.unwrap();

    let obs = exec.click(eoka_vision::ElementRef { generation: exec.generation(), index: 1 }).await.unwrap();
    let obs = exec
        .click(eoka_vision::ElementRef { generation: obs.generation, index: -1 })
        .await
        .unwrap();

    assert_eq!(exec.driver().clicks(), vec![(80.0, 20.0), (80.0, 20.0)]);
    assert_eq!(obs.elements.len(), 3);
}

#[tokio::test]
async fn test_index_one_past_last_falls_back_to_pointer() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "click", "element": 3})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    agent.run(&task("press the button after deals", START_URL)).await.unwrap();

    assert_eq!(agent.executor().driver().clicks(), vec![(0.0, 0.0)]);
    assert_eq!(agent.history().len(), 1);
}

#[tokio::test]
async fn test_scroll_wheels_at_pointer() {
    let mut exec = executor(three_element_page());
    exec.navigate(START_URL).await.unwrap();

    exec.scroll(0.0, 0.5).await.unwrap();
    let obs = exec.click(eoka_vision::ElementRef { generation: exec.generation(), index: 2 }).await.unwrap();
    exec.scroll(0.25, -0.5).await.unwrap();

    assert_eq!(obs.generation + 1, exec.generation());
    let wheels: Vec<&Event> = exec
        .driver()
        .events
        .iter()
        .filter(|e| matches!(e, Event::Scroll { .. }))
        .collect();
    assert_eq!(
        wheels,
        vec![
            &Event::Scroll { at: (0.0, 0.0), dx: 0, dy: 50 },
            &Event::Scroll { at: (140.0, 20.0), dx: 50, dy: -50 },
        ]
    );
}

#[tokio::test]
async fn test_json_block_preferred_over_trailing_note() {
    let text = format!(
        "{}\nFor reference the page title was:\n```\nExample Domain\n```",
        reply(json!({"action": "click", "element": 1}))
    );
    let oracle = ScriptedOracle::new([text, reply(json!({"action": "done"}))]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    agent.run(&task("press go", START_URL)).await.unwrap();

    assert_eq!(agent.executor().driver().clicks(), vec![(80.0, 20.0)]);
}

#[tokio::test]
async fn test_last_fenced_block_is_used() {
    let text = format!(
        "{}\nOn second thought:\n{}",
        reply(json!({"action": "click", "element": 1})),
        reply(json!({"action": "click", "element": 2}))
    );
    let oracle = ScriptedOracle::new([text, reply(json!({"action": "done"}))]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    agent.run(&task("open deals", START_URL)).await.unwrap();

    assert_eq!(agent.executor().driver().clicks(), vec![(140.0, 20.0)]);
    assert!(agent.history()[0].contains("\"element\": 2"));
}

#[tokio::test]
async fn test_index_zero_is_clickable() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "click", "element": 0})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    agent.run(&task("focus search", START_URL)).await.unwrap();

    assert_eq!(agent.executor().driver().clicks(), vec![(30.0, 20.0)]);
}

#[tokio::test]
async fn test_history_counts_browser_actions_only() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "click", "element": 0})),
        reply(json!({"action": "typing", "text": "rust", "press": "Enter"})),
        reply(json!({"action": "information", "text": "3 results"})),
        reply(json!({"action": "scroll"})),
        reply(json!({"action": "typing", "text": "more"})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    let info = agent.run(&task("search for rust", START_URL)).await.unwrap();

    assert_eq!(info, vec!["3 results".to_string()]);
    assert_eq!(agent.history().len(), 4);
    assert!(agent.history()[1].contains("\"typing\""));
    assert_eq!(
        agent.executor().driver().events[2..],
        [
            Event::Click(30.0, 20.0),
            Event::Type("rust".into()),
            Event::Key("Enter".into()),
            Event::Scroll {
                at: (30.0, 20.0),
                dx: 0,
                dy: 60
            },
            Event::Type("more".into()),
        ]
    );

    let last_prompt = agent.oracle().prompts.last().unwrap();
    assert!(last_prompt.contains("## previously browsed information\n3 results"));
    assert_eq!(last_prompt.matches("\"action\": \"click\"").count(), 2);
}

#[tokio::test]
async fn test_parse_error_is_fatal_and_keeps_log() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "information", "text": "kept"})),
        reply(json!({"action": "click", "element": 1})),
        "I can't find anything to click.".to_string(),
    ]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    let failure = agent.run(&task("find it", START_URL)).await.unwrap_err();

    assert!(matches!(failure.error, Error::OracleParse(_)));
    assert_eq!(failure.information, vec!["kept".to_string()]);
    assert_eq!(failure.history_len, 1);
    assert_eq!(agent.oracle().prompts.len(), 3);
}

#[tokio::test]
async fn test_unknown_action_is_fatal() {
    let oracle = ScriptedOracle::new([reply(json!({"action": "hover", "element": 1}))]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    let failure = agent.run(&task("hover", START_URL)).await.unwrap_err();
    assert!(matches!(failure.error, Error::OracleParse(_)));
}

#[tokio::test]
async fn test_parse_retry_reprompts() {
    let oracle = ScriptedOracle::new([
        "not json at all".to_string(),
        reply(json!({"action": "done"})),
    ]);
    let config = eoka_vision::AgentConfig {
        parse_retries: 1,
        ..fast_config()
    };
    let mut agent = Agent::new(executor(three_element_page()), oracle, config);

    agent.run(&task("finish", START_URL)).await.unwrap();

    let prompts = &agent.oracle().prompts;
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("previous answer rejected"));
    assert!(prompts[1].contains("previous answer rejected"));
    assert_eq!(agent.steps(), 1);
}

#[tokio::test]
async fn test_parse_retries_are_bounded() {
    let oracle = ScriptedOracle::new(["nope", "still nope", "never reached"]);
    let config = eoka_vision::AgentConfig {
        parse_retries: 1,
        ..fast_config()
    };
    let mut agent = Agent::new(executor(three_element_page()), oracle, config);

    let failure = agent.run(&task("finish", START_URL)).await.unwrap_err();

    assert!(matches!(failure.error, Error::OracleParse(_)));
    assert_eq!(agent.oracle().prompts.len(), 2);
}

#[tokio::test]
async fn test_step_limit() {
    let oracle = ScriptedOracle::new(vec![reply(json!({"action": "scroll", "y": 0.5})); 5]);
    let config = eoka_vision::AgentConfig {
        max_steps: Some(2),
        ..fast_config()
    };
    let mut agent = Agent::new(executor(three_element_page()), oracle, config);

    let failure = agent.run(&task("scroll forever", START_URL)).await.unwrap_err();

    assert!(matches!(failure.error, Error::StepLimit(2)));
    assert_eq!(failure.history_len, 2);
    assert_eq!(agent.oracle().prompts.len(), 2);
}

#[tokio::test]
async fn test_history_window_limits_prompt() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "scroll", "y": 0.1})),
        reply(json!({"action": "scroll", "y": 0.2})),
        reply(json!({"action": "scroll", "y": 0.3})),
        reply(json!({"action": "done"})),
    ]);
    let config = eoka_vision::AgentConfig {
        history_window: Some(1),
        ..fast_config()
    };
    let mut agent = Agent::new(executor(three_element_page()), oracle, config);

    agent.run(&task("scroll", START_URL)).await.unwrap();

    assert_eq!(agent.history().len(), 3);
    let last_prompt = agent.oracle().prompts.last().unwrap();
    assert!(last_prompt.contains("\"y\": 0.3"));
    assert!(!last_prompt.contains("\"y\": 0.1"));
}

#[tokio::test]
async fn test_runs_start_fresh() {
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "information", "text": "first"})),
        reply(json!({"action": "done"})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(three_element_page()), oracle, fast_config());

    assert_eq!(agent.run(&task("one", START_URL)).await.unwrap(), vec!["first".to_string()]);
    assert!(agent.run(&task("two", START_URL)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_settle_timeout_is_not_fatal() {
    let mut driver = three_element_page();
    driver.stuck = vec![LoadState::NetworkIdle];
    let oracle = ScriptedOracle::new([
        reply(json!({"action": "click", "element": 1})),
        reply(json!({"action": "done"})),
    ]);
    let mut agent = Agent::new(executor(driver), oracle, fast_config());

    agent.run(&task("click go", START_URL)).await.unwrap();

    assert_eq!(agent.executor().driver().clicks(), vec![(80.0, 20.0)]);
    assert_eq!(agent.executor().driver().captures, 2);
}

#[tokio::test]
async fn test_look_without_page_is_not_ready() {
    let mut exec = executor(three_element_page());
    let err = exec.look().await.unwrap_err();

    assert!(matches!(err, Error::PageNotReady(_)));
    assert!(exec.elements().is_empty());
}

#[tokio::test]
async fn test_stale_reference_rejected() {
    let mut exec = executor(three_element_page());
    let first = exec.navigate(START_URL).await.unwrap();
    let stale = exec.elements()[2].reference();
    assert_eq!(stale.generation, first.generation);

    let second = exec.look().await.unwrap();
    assert!(second.generation > first.generation);

    let err = exec.click(stale).await.unwrap_err();
    assert!(matches!(
        err,
        Error::StaleElement { index: 2, generation, current } if generation == first.generation && current == second.generation
    ));
    assert!(exec.driver().clicks().is_empty());

    exec.click(exec.elements()[2].reference()).await.unwrap();
    assert_eq!(exec.driver().clicks(), vec![(140.0, 20.0)]);
}

#[tokio::test]
async fn test_observation_matches_elements() {
    let mut exec = executor(three_element_page());
    let obs = exec.navigate(START_URL).await.unwrap();

    assert_eq!(obs.elements.len(), 3);
    for (i, el) in obs.elements.iter().enumerate() {
        assert_eq!(el.index, i);
    }
    assert_eq!(
        obs.element_list(),
        "[0] <input> \"Search\"\n[1] <button> \"Go\"\n[2] <a> \"Deals\"\n"
    );
    let img = image::load_from_memory(&obs.image).unwrap();
    assert_eq!((img.width(), img.height()), (obs.crop.width, obs.crop.height));
}

#[tokio::test]
async fn test_empty_page_observation_is_full_screenshot() {
    let mut exec = executor(FakeDriver::new());
    let obs = exec.navigate("about:blank").await.unwrap();

    assert!(obs.elements.is_empty());
    let img = image::load_from_memory(&obs.image).unwrap().to_rgba8();
    assert_eq!((img.width(), img.height()), (VIEWPORT.width, VIEWPORT.height));
    assert!(img.pixels().all(|p| p.0 == [255, 255, 255, 255]));
}

#[tokio::test]
async fn test_click_at_fraction_and_submit() {
    let mut exec = executor(three_element_page());
    exec.navigate(START_URL).await.unwrap();

    exec.click_at_fraction(0.5, 0.5).await.unwrap();
    exec.type_and_submit("rust").await.unwrap();

    assert_eq!(
        exec.driver().events[2..],
        [
            Event::Click(100.0, 50.0),
            Event::Type("rust".into()),
            Event::Key("Enter".into()),
        ]
    );
    assert_eq!(exec.pointer(), (100.0, 50.0));
}

#[tokio::test]
async fn test_debug_dir_receives_screenshots() {
    let dir = tempfile::tempdir().unwrap();
    let options = CaptureOptions {
        debug_dir: Some(dir.path().join("shots")),
        ..CaptureOptions::default()
    };
    let mut exec = Executor::new(three_element_page(), options).with_delays(SettleDelays::none());
    exec.navigate(START_URL).await.unwrap();

    let count = std::fs::read_dir(dir.path().join("shots")).unwrap().count();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_close_ends_session() {
    let mut exec = executor(three_element_page());
    exec.navigate(START_URL).await.unwrap();
    exec.close().await.unwrap();

    assert!(exec.elements().is_empty());
    assert_eq!(exec.driver().events.last(), Some(&Event::Close));
    assert!(matches!(exec.look().await, Err(Error::PageNotReady(_))));
}
