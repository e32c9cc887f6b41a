//! DOM enumeration: finds the interactive elements on the page, in document order.

use serde::Deserialize;
use tracing::debug;

use crate::driver::Driver;
use crate::element::{BBox, Element};
use crate::{Error, Result};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElement {
    selector: String,
    xpath: String,
    bbox: BBox,
    tag_name: String,
    #[serde(default)]
    text: String,
}

/// JavaScript that enumerates interactive elements visible in the viewport.
/// A `querySelectorAll('*')` walk yields document order, with open shadow
/// roots visited right after their host.
pub const OBSERVE_JS: &str = r#"
(() => {
    const INTERACTIVE = 'a, button, input, select, textarea, summary, [role="button"], [role="link"], [role="tab"], [role="checkbox"], [role="menuitem"], [onclick], [contenteditable="true"]';
    const results = [];
    const seen = new Set();
    const vw = window.innerWidth, vh = window.innerHeight;

    function xpathOf(el) {
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1) {
            if (node.id) {
                parts.unshift('//*[@id=' + JSON.stringify(node.id) + ']');
                return parts.join('/');
            }
            let i = 1;
            for (let sib = node.previousElementSibling; sib; sib = sib.previousElementSibling) {
                if (sib.tagName === node.tagName) i++;
            }
            parts.unshift(node.tagName.toLowerCase() + '[' + i + ']');
            node = node.parentElement;
        }
        return '/' + parts.join('/');
    }

    function selectorOf(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const tag = el.tagName.toLowerCase();
        if (el.name && (tag === 'input' || tag === 'select' || tag === 'textarea')) {
            return tag + '[name=' + JSON.stringify(el.name) + ']';
        }
        const parts = [];
        let node = el;
        while (node && node !== document.body && parts.length < 5) {
            let s = node.tagName.toLowerCase();
            if (node.id) {
                parts.unshift('#' + CSS.escape(node.id));
                break;
            }
            const parent = node.parentElement;
            if (parent) {
                const siblings = Array.from(parent.children).filter(c => c.tagName === node.tagName);
                if (siblings.length > 1) s += ':nth-of-type(' + (siblings.indexOf(node) + 1) + ')';
            }
            parts.unshift(s);
            node = parent;
        }
        return parts.join(' > ');
    }

    function textOf(el, tag) {
        let text = el.getAttribute('aria-label') || '';
        if (!text) {
            if (tag === 'input' || tag === 'textarea') {
                text = el.getAttribute('placeholder') || el.value || '';
            } else if (tag === 'select') {
                const opt = el.options && el.options[el.selectedIndex];
                text = opt ? opt.text : '';
            } else {
                text = (el.innerText || el.textContent || '').trim();
            }
        }
        text = text.replace(/\s+/g, ' ').trim();
        if (text.length > 80) text = text.substring(0, 77) + '...';
        return text;
    }

    function collect(root) {
        for (const node of root.querySelectorAll('*')) {
            if (node.matches(INTERACTIVE)) visit(node);
            if (node.shadowRoot) collect(node.shadowRoot);
        }
    }

    function visit(el) {
        const rect = el.getBoundingClientRect();
        if (rect.width < 2 || rect.height < 2) return;
        if (rect.bottom < 0 || rect.top > vh || rect.right < 0 || rect.left > vw) return;

        const style = getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden' || parseFloat(style.opacity) < 0.1) return;

        const selector = selectorOf(el);
        if (seen.has(selector)) return;
        seen.add(selector);

        const tag = el.tagName.toLowerCase();
        results.push({
            selector,
            xpath: xpathOf(el),
            bbox: {
                x: Math.round(rect.x),
                y: Math.round(rect.y),
                width: Math.round(rect.width),
                height: Math.round(rect.height),
            },
            tagName: tag,
            text: textOf(el, tag),
        });
    }

    if (!document.body) return JSON.stringify(null);
    collect(document);
    return JSON.stringify(results);
})()
"#;

/// Run the extraction script and assign dense indices tagged with `generation`.
///
/// Fails with [`Error::PageNotReady`] when there is no page or no document
/// body yet; a malformed element fails the whole call rather than being
/// dropped.
pub async fn extract<D: Driver + ?Sized>(driver: &mut D, generation: u64) -> Result<Vec<Element>> {
    if !driver.has_page() {
        return Err(Error::PageNotReady(
            "no page to query, navigate first".into(),
        ));
    }
    let json = driver.evaluate(OBSERVE_JS).await?;
    let elements = parse(&json, generation)?;
    debug!("extracted {} elements (generation {})", elements.len(), generation);
    Ok(elements)
}

/// Parse the script's JSON output into indexed elements.
pub fn parse(json: &str, generation: u64) -> Result<Vec<Element>> {
    let raw: Option<Vec<RawElement>> = serde_json::from_str(json)
        .map_err(|e| Error::PageNotReady(format!("element query returned bad data: {}", e)))?;
    let raw = raw.ok_or_else(|| Error::PageNotReady("document has no body yet".into()))?;

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, r)| Element {
            index,
            generation,
            selector: r.selector,
            xpath: r.xpath,
            bbox: r.bbox,
            tag: r.tag_name,
            text: r.text,
        })
        .collect())
}
