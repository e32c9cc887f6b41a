//! In-memory browser and scripted oracle for driving the loop without Chrome.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use eoka_vision::annotate::encode_png;
use eoka_vision::observe::OBSERVE_JS;
use eoka_vision::{
    AgentConfig, CaptureOptions, DecisionRequest, Driver, Error, Executor, LoadState, Oracle,
    Result, SettleDelays, Task, Viewport,
};
use serde_json::json;

pub const VIEWPORT: Viewport = Viewport {
    width: 200,
    height: 100,
};

/// Browser-side effects, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Launch,
    Goto(String),
    Click(f64, f64),
    Type(String),
    Key(String),
    /// Wheel at `at` by `(dx, dy)`.
    Scroll { at: (f64, f64), dx: i64, dy: i64 },
    Close,
}

pub struct FakeDriver {
    pages: HashMap<String, String>,
    current: Option<String>,
    launched: bool,
    pub events: Vec<Event>,
    /// Load states that never arrive.
    pub stuck: Vec<LoadState>,
    /// Number of element extractions run.
    pub captures: usize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current: None,
            launched: false,
            events: Vec::new(),
            stuck: Vec::new(),
            captures: 0,
        }
    }

    /// Serve `elements` (as returned by the extraction script) at `url`.
    pub fn with_page(mut self, url: &str, elements: serde_json::Value) -> Self {
        self.pages.insert(url.to_string(), elements.to_string());
        self
    }

    pub fn clicks(&self) -> Vec<(f64, f64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Click(x, y) => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    fn require_page(&self) -> Result<()> {
        if self.launched {
            Ok(())
        } else {
            Err(Error::PageNotReady("fake browser not launched".into()))
        }
    }
}

#[async_trait(?Send)]
impl Driver for FakeDriver {
    fn has_page(&self) -> bool {
        self.launched
    }

    async fn ensure_page(&mut self) -> Result<()> {
        if !self.launched {
            self.launched = true;
            self.events.push(Event::Launch);
        }
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.require_page()?;
        self.current = Some(self.pages.get(url).cloned().unwrap_or_else(|| "[]".into()));
        self.events.push(Event::Goto(url.to_string()));
        Ok(())
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<()> {
        self.require_page()?;
        self.events.push(Event::Click(x, y));
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<()> {
        self.require_page()?;
        self.events.push(Event::Type(text.to_string()));
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> Result<()> {
        self.require_page()?;
        self.events.push(Event::Key(key.to_string()));
        Ok(())
    }

    async fn scroll_by(&mut self, x: f64, y: f64, dx: i64, dy: i64) -> Result<()> {
        self.require_page()?;
        self.events.push(Event::Scroll { at: (x, y), dx, dy });
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<String> {
        self.require_page()?;
        if script == OBSERVE_JS {
            self.captures += 1;
            return Ok(self.current.clone().unwrap_or_else(|| "null".into()));
        }
        Ok("null".into())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.require_page()?;
        let img = image::RgbaImage::from_pixel(VIEWPORT.width, VIEWPORT.height, image::Rgba([255, 255, 255, 255]));
        encode_png(&img)
    }

    async fn viewport(&mut self) -> Result<Viewport> {
        self.require_page()?;
        Ok(VIEWPORT)
    }

    async fn wait_for_load_state(&mut self, state: LoadState, timeout_ms: u64) -> Result<()> {
        self.require_page()?;
        if self.stuck.contains(&state) {
            return Err(Error::SettleTimeout { state, timeout_ms });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.launched = false;
        self.current = None;
        self.events.push(Event::Close);
        Ok(())
    }
}

/// Replies with canned responses in order and records every prompt.
pub struct ScriptedOracle {
    replies: VecDeque<String>,
    pub prompts: Vec<String>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }
}

#[async_trait(?Send)]
impl Oracle for ScriptedOracle {
    async fn decide(&mut self, request: &DecisionRequest) -> Result<String> {
        assert!(!request.image_base64.is_empty(), "oracle asked without an image");
        self.prompts.push(request.prompt.clone());
        self.replies
            .pop_front()
            .ok_or_else(|| Error::Oracle("script exhausted".into()))
    }
}

/// Wrap a `nextAction` object the way a model would answer.
pub fn reply(next_action: serde_json::Value) -> String {
    format!(
        "Looking at the screenshot.\n```json\n{}\n```",
        serde_json::to_string_pretty(&json!({
            "briefExplanation": "next step",
            "nextAction": next_action,
        }))
        .unwrap()
    )
}

/// Extraction-script output for boxes given as `(tag, text, x, y, w, h)`.
pub fn elements(specs: &[(&str, &str, f64, f64, f64, f64)]) -> serde_json::Value {
    serde_json::Value::Array(
        specs
            .iter()
            .enumerate()
            .map(|(i, (tag, text, x, y, w, h))| {
                json!({
                    "selector": format!("#e{}", i),
                    "xpath": format!("//*[@id=\"e{}\"]", i),
                    "bbox": {"x": x, "y": y, "width": w, "height": h},
                    "tagName": tag,
                    "text": text,
                })
            })
            .collect(),
    )
}

pub const START_URL: &str = "https://shop.test/";

/// A page with three side-by-side elements:
/// centers at (30, 20), (80, 20) and (140, 20).
pub fn three_element_page() -> FakeDriver {
    FakeDriver::new().with_page(
        START_URL,
        elements(&[
            ("input", "Search", 10.0, 10.0, 40.0, 20.0),
            ("button", "Go", 60.0, 10.0, 40.0, 20.0),
            ("a", "Deals", 110.0, 10.0, 60.0, 20.0),
        ]),
    )
}

pub fn executor(driver: FakeDriver) -> Executor<FakeDriver> {
    Executor::new(driver, CaptureOptions::default()).with_delays(SettleDelays::none())
}

pub fn fast_config() -> AgentConfig {
    AgentConfig::default().with_step_delay(0)
}

pub fn task(instruction: &str, url: &str) -> Task {
    Task {
        instruction: instruction.into(),
        url: url.into(),
    }
}
