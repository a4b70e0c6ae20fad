use super::types::StepNode;
use crate::codec::action_path::clamp_id;
use crate::error::ParseError;
use crate::utils::config::Config;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

const STEP_TAG: &[u8] = b"step";
const COMPREF_TAG: &[u8] = b"compref";
const STRING_TAG: &[u8] = b"parameterizedString";

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9A-Fa-f]+|#[0-9]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

static LINE_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static BLOCK_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(p|div|li|tr)\s*>").unwrap());

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").unwrap());

static DEFAULT_PARSER: Lazy<StepParser> = Lazy::new(StepParser::default);

/// Parse a step markup document with the default verify/assert markers.
pub fn parse(markup: &str) -> Vec<StepNode> {
    DEFAULT_PARSER.parse(markup)
}

/// Decode one level of HTML entities
/// Handles: &amp; &lt; &gt; &quot; &apos; &nbsp; &#NNN; (decimal) &#xHHH; (hex)
///
/// Runs as a single pass, so `&amp;lt;` becomes `&lt;` and not `<`.
pub fn decode_html_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// Turn line-break markers into newlines
pub fn normalize_line_breaks(text: &str) -> String {
    LINE_BREAK_RE.replace_all(text, "\n").into_owned()
}

/// Plain text of a formatted (HTML) step string: line breaks and block ends
/// become newlines, other tags are dropped and entities decoded.
pub fn html_to_text(html: &str) -> String {
    let text = normalize_line_breaks(html);
    let text = BLOCK_END_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    decode_html_entities(&text)
}

/// Parser for ALM step markup.
///
/// ```text
/// <steps id="0" last="4">
///   <step id="1" type="ActionStep">
///     <parameterizedString isformatted="true">&lt;P&gt;Open the app&lt;/P&gt;</parameterizedString>
///     <parameterizedString isformatted="true">Verify the home screen</parameterizedString>
///   </step>
///   <compref id="2" ref="500" />
/// </steps>
/// ```
///
/// Text of a `parameterizedString` is decoded once at the XML level. Strings
/// flagged `isformatted="true"` then carry HTML, which is reduced to text.
pub struct StepParser {
    /// `None` when no markers are configured
    expected_split: Option<Regex>,
}

impl Default for StepParser {
    fn default() -> Self {
        Self::with_markers(&Config::default().expected_result_markers)
    }
}

/// A step or compref element whose end tag has not been seen yet
struct OpenNode {
    node: StepNode,
    strings: Vec<String>,
}

/// Text being collected for a parameterizedString
struct Capture {
    text: String,
    formatted: bool,
    depth: usize,
}

impl Capture {
    fn finish(self) -> String {
        let text = if self.formatted {
            html_to_text(&self.text)
        } else {
            normalize_line_breaks(&self.text)
        };
        tidy_text(&text)
    }
}

impl StepParser {
    pub fn new(config: &Config) -> Self {
        Self::with_markers(&config.expected_result_markers)
    }

    pub fn with_markers<S: AsRef<str>>(markers: &[S]) -> Self {
        let alternatives: Vec<String> = markers
            .iter()
            .map(|m| m.as_ref().trim())
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Self {
                expected_split: None,
            };
        }

        let pattern = format!(r"(?i)\b(?:{})", alternatives.join("|"));
        let expected_split = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Invalid expected result markers ({}), splitting disabled", e);
                None
            }
        };
        Self { expected_split }
    }

    /// Parse markup into top-level nodes in document order.
    /// Malformed or empty markup gives an empty list.
    pub fn parse(&self, markup: &str) -> Vec<StepNode> {
        self.try_parse(markup).unwrap_or_else(|e| {
            log::warn!("Discarding malformed step markup: {}", e);
            Vec::new()
        })
    }

    /// Parse markup, reporting malformed input. Empty markup is an empty list.
    pub fn try_parse(&self, markup: &str) -> Result<Vec<StepNode>, ParseError> {
        if markup.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.parse_document(markup)
    }

    /// Split assertion text into one entry per verify/assert marker
    pub fn split_expected(&self, text: &str) -> Vec<String> {
        let mut segments = Vec::new();
        let mut last = 0;
        if let Some(re) = &self.expected_split {
            for m in re.find_iter(text) {
                segments.push(&text[last..m.start()]);
                last = m.start();
            }
        }
        segments.push(&text[last..]);

        segments
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn parse_document(&self, xml: &str) -> Result<Vec<StepNode>, ParseError> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();

        let mut output = Vec::new();
        let mut stack: Vec<OpenNode> = Vec::new();
        let mut capture: Option<Capture> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    if let Some(cap) = capture.as_mut() {
                        cap.depth += 1;
                    } else {
                        match e.name().as_ref() {
                            STEP_TAG | COMPREF_TAG => stack.push(open_node(e)),
                            STRING_TAG if !stack.is_empty() => {
                                capture = Some(Capture {
                                    text: String::new(),
                                    formatted: is_formatted(e),
                                    depth: 0,
                                });
                            }
                            _ => {}
                        }
                    }
                }
                Ok(Event::Empty(ref e)) if capture.is_some() => {
                    if let Some(cap) = capture.as_mut() {
                        if e.name().as_ref().eq_ignore_ascii_case(b"br") {
                            cap.text.push('\n');
                        }
                    }
                }
                Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                    STEP_TAG | COMPREF_TAG => {
                        let node = self.finish_node(open_node(e));
                        attach(node, &mut stack, &mut output);
                    }
                    STRING_TAG => {
                        if let Some(open) = stack.last_mut() {
                            open.strings.push(String::new());
                        }
                    }
                    _ => {}
                },
                Ok(Event::End(ref e)) => match capture.take() {
                    Some(mut cap) if cap.depth > 0 => {
                        cap.depth -= 1;
                        if is_block_tag(e.name().as_ref()) && !cap.text.ends_with('\n') {
                            cap.text.push('\n');
                        }
                        capture = Some(cap);
                    }
                    Some(cap) => {
                        if let Some(open) = stack.last_mut() {
                            open.strings.push(cap.finish());
                        }
                    }
                    None => {
                        if matches!(e.name().as_ref(), STEP_TAG | COMPREF_TAG) {
                            if let Some(open) = stack.pop() {
                                let node = self.finish_node(open);
                                attach(node, &mut stack, &mut output);
                            }
                        }
                    }
                },
                Ok(Event::Text(e)) => {
                    if let Some(cap) = capture.as_mut() {
                        let raw = e.into_inner();
                        cap.text
                            .push_str(&decode_html_entities(&String::from_utf8_lossy(&raw)));
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(cap) = capture.as_mut() {
                        let raw = e.into_inner();
                        cap.text.push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ParseError::Malformed {
                        position: reader.buffer_position(),
                        message: e.to_string(),
                    })
                }
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() || capture.is_some() {
            return Err(ParseError::Truncated);
        }

        Ok(output)
    }

    fn finish_node(&self, open: OpenNode) -> StepNode {
        let OpenNode { mut node, strings } = open;
        let mut strings = strings.into_iter();
        node.action = strings.next().unwrap_or_default();
        node.expected_results = strings
            .next()
            .map(|text| self.split_expected(&text))
            .unwrap_or_default();
        node
    }
}

fn open_node(e: &BytesStart) -> OpenNode {
    let mut id = None;
    let mut ref_id = None;

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let value = String::from_utf8_lossy(&attr.value);
        match attr.key.as_ref() {
            b"id" => id = Some(parse_id(&value)),
            b"ref" => ref_id = Some(parse_id(&value)),
            _ => {}
        }
    }

    let placement_id = id.unwrap_or_else(|| {
        log::warn!("Step element without id, using 0");
        0
    });

    let node = if e.name().as_ref() == COMPREF_TAG {
        let ref_id = ref_id.unwrap_or_else(|| {
            log::warn!("Shared step reference {} without ref, using 0", placement_id);
            0
        });
        StepNode::shared_reference(placement_id, ref_id)
    } else {
        StepNode::leaf(placement_id, "")
    };

    OpenNode {
        node,
        strings: Vec::new(),
    }
}

fn is_formatted(e: &BytesStart) -> bool {
    e.attributes()
        .filter_map(|a| a.ok())
        .any(|attr| attr.key.as_ref() == b"isformatted" && attr.value.eq_ignore_ascii_case(b"true"))
}

fn parse_id(value: &str) -> u32 {
    let value = value.trim();
    match value.parse::<i64>() {
        Ok(raw) => clamp_id(raw),
        Err(_) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
            clamp_id(i64::MAX)
        }
        Err(_) => {
            log::warn!("Non-numeric step id '{}', using 0", value);
            0
        }
    }
}

/// Place a finished node under its shared reference, or at top level.
/// Steps cannot contain steps, so a node closed inside a leaf is dropped.
fn attach(node: StepNode, stack: &mut [OpenNode], output: &mut Vec<StepNode>) {
    match stack.last_mut() {
        Some(parent) if parent.node.is_leaf() => {
            log::warn!(
                "Dropping element {} nested inside step {}",
                node.placement_id,
                parent.node.placement_id
            );
        }
        Some(parent) => parent.node.inline_children.push(node),
        None => output.push(node),
    }
}

fn is_block_tag(name: &[u8]) -> bool {
    matches!(
        name.to_ascii_lowercase().as_slice(),
        b"p" | b"div" | b"li" | b"tr"
    )
}

/// Trim every line and drop blank ones
fn tidy_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::parser::types::StepKind;

    #[test]
    fn test_parse_leaves_in_order() {
        let markup = r#"<steps id="0" last="3">
            <step id="1" type="ActionStep">
                <parameterizedString isformatted="true">Open the app</parameterizedString>
                <parameterizedString isformatted="true">Verify home screen</parameterizedString>
                <description/>
            </step>
            <step id="3" type="ActionStep">
                <parameterizedString isformatted="true">Tap login</parameterizedString>
                <parameterizedString isformatted="true"/>
            </step>
        </steps>"#;

        let nodes = parse(markup);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].placement_id, 1);
        assert_eq!(nodes[0].action, "Open the app");
        assert_eq!(nodes[0].expected_results, vec!["Verify home screen"]);
        assert_eq!(nodes[1].placement_id, 3);
        assert!(nodes[1].expected_results.is_empty());
    }

    #[test]
    fn test_parse_shared_reference_with_inline_children() {
        let markup = r#"<steps id="0" last="5">
            <step id="1" type="ActionStep"><parameterizedString>a</parameterizedString></step>
            <compref id="2" ref="500">
                <step id="4" type="ActionStep"><parameterizedString>inline</parameterizedString></step>
            </compref>
            <compref id="5" ref="501" />
        </steps>"#;

        let nodes = parse(markup);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].kind, StepKind::SharedReference { ref_id: 500 });
        assert_eq!(nodes[1].placement_id, 2);
        assert_eq!(nodes[1].inline_children.len(), 1);
        assert_eq!(nodes[1].inline_children[0].action, "inline");
        assert_eq!(nodes[2].ref_id(), Some(501));
        assert!(nodes[2].inline_children.is_empty());
    }

    #[test]
    fn test_formatted_text_is_decoded() {
        let markup = r#"<steps><step id="1" type="ActionStep"><parameterizedString isformatted="true">&lt;DIV&gt;&lt;P&gt;Enter &amp;quot;admin&amp;quot;&lt;BR/&gt;then submit&lt;/P&gt;&lt;/DIV&gt;</parameterizedString><parameterizedString isformatted="true">&lt;P&gt;Tom &amp;amp; Jerry&lt;/P&gt;</parameterizedString></step></steps>"#;

        let nodes = parse(markup);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].action, "Enter \"admin\"\nthen submit");
        assert_eq!(nodes[0].expected_results, vec!["Tom & Jerry"]);
    }

    #[test]
    fn test_split_expected_on_markers() {
        let parser = StepParser::default();
        assert_eq!(
            parser.split_expected("Verify title is shown assert button enabled VERIFY footer"),
            vec!["Verify title is shown", "assert button enabled", "VERIFY footer"]
        );
        assert_eq!(
            parser.split_expected("Page loads. Verify banner"),
            vec!["Page loads.", "Verify banner"]
        );
        // "reassert" does not start a new assertion
        assert_eq!(
            parser.split_expected("verify we reassert it"),
            vec!["verify we reassert it"]
        );
        assert!(parser.split_expected("   ").is_empty());
    }

    #[test]
    fn test_custom_markers() {
        let parser = StepParser::with_markers(&["check"]);
        assert_eq!(
            parser.split_expected("check a verify b check c"),
            vec!["check a verify b", "check c"]
        );
    }

    #[test]
    fn test_malformed_markup_is_empty() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
        assert!(parse("<steps><step id=\"1\"></steps>").is_empty());
        assert!(parse("<steps><step id=\"1\">").is_empty());
    }

    #[test]
    fn test_out_of_range_ids_are_clamped() {
        let nodes = parse(r#"<steps><step id="-4"/><step id="99999999999"/><step id="x"/></steps>"#);
        let ids: Vec<u32> = nodes.iter().map(|n| n.placement_id).collect();
        assert_eq!(ids, vec![0, u32::MAX, 0]);
    }

    #[test]
    fn test_decode_html_entities_single_pass() {
        assert_eq!(decode_html_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_html_entities("&#65;&#x42;&unknown;"), "AB&unknown;");
        assert_eq!(normalize_line_breaks("a<br />b<BR>c"), "a\nb\nc");
        assert_eq!(html_to_text("<P>a &amp;lt; b</P><div>c</div>"), "a &lt; b\nc\n");
    }

    #[test]
    fn test_plain_text_keeps_escaped_characters() {
        let markup = r#"<steps>
            <step id="1" type="ActionStep">
                <parameterizedString isformatted="false">count &lt; 5 &amp;&amp; x &gt; 1</parameterizedString>
                <parameterizedString isformatted="false">Verify &lt;b&gt; is literal</parameterizedString>
            </step>
            <step id="2" type="ActionStep"/>
        </steps>"#;

        let nodes = parse(markup);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].action, "count < 5 && x > 1");
        assert_eq!(nodes[0].expected_results, vec!["Verify <b> is literal"]);
        assert_eq!(nodes[1].placement_id, 2);
    }

    #[test]
    fn test_try_parse_reports_malformed_markup() {
        let parser = StepParser::default();
        assert!(matches!(parser.try_parse(""), Ok(nodes) if nodes.is_empty()));
        assert!(matches!(
            parser.try_parse("<steps><step id=\"1\">"),
            Err(ParseError::Truncated)
        ));
        assert!(matches!(
            parser.try_parse("<steps><step id=\"1\"></steps>"),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_step_nested_in_step_is_dropped() {
        let nodes = parse(
            r#"<steps><step id="1"><step id="2"/></step><step id="3"/></steps>"#,
        );
        let ids: Vec<u32> = nodes.iter().map(|n| n.placement_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
