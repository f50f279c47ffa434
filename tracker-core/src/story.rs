//! The tracker story model and its XML wire format.
//!
//! Descriptive fields are three-valued: `None` means the element was absent
//! (and is omitted on serialization), `Some("")` means it was present but
//! empty (and is serialized as an empty element).

use std::collections::BTreeSet;
use std::ops::Range;

use roxmltree::{Document, Node};

use crate::date::{format_tracker_datetime, parse_tracker_datetime};
use crate::error::{TrackerError, TrackerResult};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
const STORY_TAG: &str = "story";
const STORIES_TAG: &str = "stories";

/// The time-boxed planning period a story is scheduled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Iteration {
    pub number: Option<i64>,
    pub start: Option<i64>,
    /// The tracker's estimate of when the iteration's stories complete
    pub finish: Option<i64>,
}

/// A tracked unit of work: bug, feature, chore or release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Story {
    story_id: Option<i64>,
    story_type: Option<String>,
    url: Option<String>,
    /// -1 is the tracker's "unestimated" marker and is kept as-is
    estimate: Option<i64>,
    current_state: Option<String>,
    description: Option<String>,
    name: Option<String>,
    requested_by: Option<String>,
    owned_by: Option<String>,
    created_at: Option<i64>,
    deadline: Option<i64>,
    accepted_at: Option<i64>,
    iteration: Option<Iteration>,
    labels: Option<BTreeSet<String>>,
}

impl Story {
    /// An empty story, for building a new one to submit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single `<story>` document.
    pub fn from_xml(xml: &str) -> TrackerResult<Self> {
        let doc = Document::parse(xml.trim())?;
        let root = doc.root_element();

        if root.tag_name().name() != STORY_TAG {
            return Err(TrackerError::Parse(format!(
                "expected <{}> root element, found <{}>",
                STORY_TAG,
                root.tag_name().name()
            )));
        }

        Self::from_node(root)
    }

    fn from_node(node: Node) -> TrackerResult<Self> {
        let mut story = Story::new();

        for child in node.children().filter(|n| n.is_element()) {
            let text = element_text(child);

            match child.tag_name().name() {
                "id" => story.story_id = Some(parse_integer("id", &text)?),
                "story_type" => story.story_type = Some(text),
                "url" => story.url = Some(text),
                "estimate" => story.estimate = Some(parse_integer("estimate", &text)?),
                "current_state" => story.current_state = Some(text),
                "description" => story.description = Some(text),
                "name" => story.name = Some(text),
                "requested_by" => story.requested_by = Some(text),
                "owned_by" => story.owned_by = Some(text),
                "created_at" => story.created_at = Some(parse_tracker_datetime(&text)?),
                "deadline" => story.deadline = Some(parse_tracker_datetime(&text)?),
                "accepted_at" => story.accepted_at = Some(parse_tracker_datetime(&text)?),
                "iteration" => story.iteration = Some(Iteration::from_node(child)?),
                "labels" => story.labels = Some(parse_labels(&text)),
                _ => {}
            }
        }

        Ok(story)
    }

    pub fn story_id(&self) -> Option<i64> {
        self.story_id
    }

    pub fn story_type(&self) -> Option<&str> {
        self.story_type.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn estimate(&self) -> Option<i64> {
        self.estimate
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn requested_by(&self) -> Option<&str> {
        self.requested_by.as_deref()
    }

    pub fn owned_by(&self) -> Option<&str> {
        self.owned_by.as_deref()
    }

    pub fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    pub fn deadline(&self) -> Option<i64> {
        self.deadline
    }

    pub fn accepted_at(&self) -> Option<i64> {
        self.accepted_at
    }

    /// The iteration number, if the story is scheduled in one.
    pub fn iteration(&self) -> Option<i64> {
        self.iteration.as_ref().and_then(|i| i.number)
    }

    pub fn iteration_finish(&self) -> Option<i64> {
        self.iteration.as_ref().and_then(|i| i.finish)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn set_owned_by(&mut self, owned_by: impl Into<String>) {
        self.owned_by = Some(owned_by.into());
    }

    pub fn set_requested_by(&mut self, requested_by: impl Into<String>) {
        self.requested_by = Some(requested_by.into());
    }

    pub fn set_estimate(&mut self, estimate: i64) {
        self.estimate = Some(estimate);
    }

    /// Set the estimate from text, which must be an integer.
    pub fn set_estimate_text(&mut self, estimate: &str) -> TrackerResult<()> {
        self.estimate = Some(parse_integer("estimate", estimate)?);
        Ok(())
    }

    pub fn set_deadline(&mut self, timestamp: i64) {
        self.deadline = Some(timestamp);
    }

    pub fn set_created_at(&mut self, timestamp: i64) {
        self.created_at = Some(timestamp);
    }

    /// Add a label. Adding one that is already present does nothing.
    ///
    /// Labels are trimmed; empty labels and labels containing a comma are
    /// rejected since they cannot be told apart in the comma-joined form.
    pub fn add_label(&mut self, label: &str) -> TrackerResult<()> {
        let label = label.trim();
        if label.is_empty() || label.contains(',') {
            return Err(TrackerError::Type(format!(
                "label must be non-empty and contain no commas, got '{}'",
                label
            )));
        }

        self.labels
            .get_or_insert_with(BTreeSet::new)
            .insert(label.to_string());
        Ok(())
    }

    /// Remove a label. Removing one that is not present does nothing.
    pub fn remove_label(&mut self, label: &str) {
        if let Some(labels) = self.labels.as_mut() {
            labels.remove(label.trim());
        }
    }

    /// Labels sorted and comma-joined, or `None` if the story never had any.
    pub fn labels_as_string(&self) -> Option<String> {
        self.labels
            .as_ref()
            .map(|labels| labels.iter().cloned().collect::<Vec<_>>().join(","))
    }

    /// Serialize to a `<story>` document, emitting only the fields that are set.
    pub fn to_xml(&self) -> TrackerResult<String> {
        let mut body = String::new();

        push_integer(&mut body, "id", self.story_id);
        push_text(&mut body, "story_type", self.story_type.as_deref())?;
        push_text(&mut body, "url", self.url.as_deref())?;
        push_integer(&mut body, "estimate", self.estimate);
        push_text(&mut body, "current_state", self.current_state.as_deref())?;
        push_text(&mut body, "description", self.description.as_deref())?;
        push_text(&mut body, "name", self.name.as_deref())?;
        push_text(&mut body, "requested_by", self.requested_by.as_deref())?;
        push_text(&mut body, "owned_by", self.owned_by.as_deref())?;
        push_datetime(&mut body, "created_at", self.created_at)?;
        push_datetime(&mut body, "deadline", self.deadline)?;
        push_datetime(&mut body, "accepted_at", self.accepted_at)?;

        if let Some(iteration) = &self.iteration {
            body.push_str("<iteration>");
            if let Some(number) = iteration.number {
                body.push_str(&format!("<number>{}</number>", number));
            }
            push_datetime(&mut body, "start", iteration.start)?;
            push_datetime(&mut body, "finish", iteration.finish)?;
            body.push_str("</iteration>");
        }

        push_text(&mut body, "labels", self.labels_as_string().as_deref())?;

        if body.is_empty() {
            Ok(format!("{}<{}/>", XML_DECLARATION, STORY_TAG))
        } else {
            Ok(format!(
                "{}<{}>{}</{}>",
                XML_DECLARATION, STORY_TAG, body, STORY_TAG
            ))
        }
    }
}

impl Iteration {
    fn from_node(node: Node) -> TrackerResult<Self> {
        let mut iteration = Iteration::default();

        for child in node.children().filter(|n| n.is_element()) {
            let text = element_text(child);

            match child.tag_name().name() {
                "number" => iteration.number = Some(parse_integer("iteration number", &text)?),
                "start" => iteration.start = Some(parse_tracker_datetime(&text)?),
                "finish" => iteration.finish = Some(parse_tracker_datetime(&text)?),
                _ => {}
            }
        }

        Ok(iteration)
    }
}

/// Split a tracker response into one XML fragment per story.
///
/// Accepts either a `<stories>` list or a single `<story>` document.
pub fn split_stories(xml: &str) -> TrackerResult<Vec<String>> {
    let xml = xml.trim();
    let doc = Document::parse(xml)?;
    let root = doc.root_element();

    let slice = |range: Range<usize>| xml[range].to_string();

    match root.tag_name().name() {
        STORY_TAG => Ok(vec![slice(root.range())]),
        STORIES_TAG => Ok(root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == STORY_TAG)
            .map(|n| slice(n.range()))
            .collect()),
        other => Err(TrackerError::Parse(format!(
            "expected <{}> or <{}> root element, found <{}>",
            STORIES_TAG, STORY_TAG, other
        ))),
    }
}

/// All text directly inside an element. Empty elements give "".
fn element_text(node: Node) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn parse_integer(field: &str, text: &str) -> TrackerResult<i64> {
    text.trim()
        .parse()
        .map_err(|_| TrackerError::Type(format!("{} must be an integer, got '{}'", field, text)))
}

fn parse_labels(text: &str) -> BTreeSet<String> {
    text.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(String::from)
        .collect()
}

fn push_text(out: &mut String, tag: &str, value: Option<&str>) -> TrackerResult<()> {
    if let Some(value) = value {
        out.push_str(&format!("<{}>{}</{}>", tag, escape_text(tag, value)?, tag));
    }
    Ok(())
}

fn push_integer(out: &mut String, tag: &str, value: Option<i64>) {
    if let Some(value) = value {
        out.push_str(&format!(r#"<{} type="integer">{}</{}>"#, tag, value, tag));
    }
}

fn push_datetime(out: &mut String, tag: &str, value: Option<i64>) -> TrackerResult<()> {
    if let Some(value) = value {
        let text = format_tracker_datetime(value)?;
        out.push_str(&format!(r#"<{} type="datetime">{}</{}>"#, tag, text, tag));
    }
    Ok(())
}

/// Escape text content. Carriage returns become `&#13;` so they survive
/// end-of-line normalization; other control characters cannot appear in XML.
fn escape_text(tag: &str, text: &str) -> TrackerResult<String> {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' | '\n' => escaped.push(c),
            c if c.is_control() && (c as u32) < 0x20 => {
                return Err(TrackerError::Type(format!(
                    "{} contains control character U+{:04X}",
                    tag, c as u32
                )));
            }
            _ => escaped.push(c),
        }
    }
    Ok(escaped)
}
