//! Decision prompt template.

/// Placeholder for an empty history or information log.
pub const NONE: &str = "none";

const TEMPLATE: &str = r#"## candidate actions
type Click = { action: "click", element: number }
type Typing = { action: "typing", text: string, press?: string }
type Scroll = { action: "scroll", x: float, y: float }
type Information = { action: "information", text: string }
type Done = { action: "done" }

## what each action does
- click: clicks the element whose label number appears in the screenshot.
- typing: types text into the focused field. Set `press` to a key name such as "Enter" to press it afterwards.
- scroll: scrolls the page by `x` and `y`, given as fractions of the viewport width and height.
- information: records a fact that matters for the task, for example a price or a title. The page is not touched.
- done: the task is complete.

## response format
{
    "briefExplanation": string,
    "nextAction": Click | Typing | Scroll | Information | Done
}

## task
{task}

## history
{history}

## previously browsed information
{information}

## instructions
The image is a screenshot of the current page. Interactive elements are outlined and carry a number label.
Look at the elements and their labels carefully, then reason step by step.
Choose the single next action that moves the browser toward finishing the task.
Answer with one JSON object inside a ```json code block.

## examples
{
    "briefExplanation": "The search button carries label 5, so click element 5.",
    "nextAction": { "action": "click", "element": 5 }
}
{
    "briefExplanation": "The listed prices are $314.99, $17.99 and $9.99. Record them before comparing.",
    "nextAction": { "action": "information", "text": "Prices: $314.99, $17.99, $9.99" }
}
{
    "briefExplanation": "The details link is not labelled yet. Scroll down to bring it into view.",
    "nextAction": { "action": "scroll", "x": 0.0, "y": 0.6 }
}
{
    "briefExplanation": "A pop-up hides the search button, so submit the query from the keyboard.",
    "nextAction": { "action": "typing", "text": "", "press": "Enter" }
}
"#;

/// Fill the template. `history_window` keeps only that many trailing
/// history entries; the information log is always embedded in full.
pub fn build(
    instruction: &str,
    history: &[String],
    information: &[String],
    history_window: Option<usize>,
) -> String {
    let history = match history_window {
        Some(n) => &history[history.len().saturating_sub(n)..],
        None => history,
    };
    fill(&[
        ("{task}", instruction),
        ("{history}", join_or_none(history).as_str()),
        ("{information}", join_or_none(information).as_str()),
    ])
}

/// Substitute placeholders in template order. Values are never rescanned,
/// so braces inside them stay literal.
fn fill(values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(TEMPLATE.len() + 256);
    let mut rest = TEMPLATE;
    for (key, value) in values {
        if let Some(pos) = rest.find(key) {
            out.push_str(&rest[..pos]);
            out.push_str(value);
            rest = &rest[pos + key.len()..];
        }
    }
    out.push_str(rest);
    out
}

/// Note appended when the previous answer could not be parsed.
pub fn correction(error: &str) -> String {
    format!(
        "\n## previous answer rejected\nYour last answer could not be used: {}\nReply again with exactly one ```json block holding briefExplanation and nextAction.\n",
        error
    )
}

fn join_or_none(lines: &[String]) -> String {
    if lines.is_empty() {
        NONE.to_string()
    } else {
        lines.join("\n")
    }
}
