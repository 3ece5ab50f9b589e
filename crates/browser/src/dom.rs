//! HTML page model using the `scraper` crate.
//!
//! Turns a fetched document into the addressable elements, forms and
//! readable text the HTTP environment works with. Elements are listed in
//! document order; an element's index is its position in that list.

use std::collections::{BTreeMap, HashMap};

use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

/// Selector for everything a user could interact with.
const INTERACTIVE: &str = "a[href], button, input, select, textarea, [onclick], \
     [role=button], [role=link], [role=checkbox], [role=tab], [role=menuitem]";

/// Attributes that identify an element across captures. `value` is
/// excluded since typing changes it.
const STABLE_ATTRIBUTES: &[&str] = &["id", "name", "type", "href", "role", "aria-label", "action"];

/// Attributes worth showing to the model.
const SHOWN_ATTRIBUTES: &[&str] = &[
    "href",
    "type",
    "name",
    "placeholder",
    "aria-label",
    "title",
    "alt",
    "value",
];

const MAX_ELEMENT_TEXT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// A form and every field it would submit, hidden fields included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    /// Absolute submission URL
    pub action: String,
    pub method: FormMethod,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// Value submitted when nothing was typed or toggled
    pub default: Option<String>,
    /// Position in [`ParsedPage::elements`]; `None` for hidden inputs
    pub element: Option<usize>,
    /// Checkbox or radio: only submitted while checked
    pub toggle: bool,
    pub checked_by_default: bool,
}

/// What clicking an element does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Link { href: String, new_tab: bool },
    Submit { form: Option<usize>, name: Option<String>, value: Option<String> },
    TextField { form: Option<usize> },
    Toggle { form: Option<usize>, radio_group: Option<String> },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub structural_hash: String,
    pub kind: ElementKind,
}

impl PageElement {
    pub fn is_password(&self) -> bool {
        self.tag == "input"
            && self
                .attributes
                .get("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("password"))
    }
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub url: String,
    pub title: String,
    pub elements: Vec<PageElement>,
    pub forms: Vec<Form>,
    /// Visible text, whitespace-collapsed
    pub text: String,
}

impl ParsedPage {
    pub fn blank() -> Self {
        Self {
            url: "about:blank".into(),
            title: String::new(),
            elements: Vec::new(),
            forms: Vec::new(),
            text: String::new(),
        }
    }

    /// A non-HTML response: readable text, nothing to interact with.
    pub fn plain(url: &str, body: &str) -> Self {
        Self {
            url: url.into(),
            title: url.into(),
            elements: Vec::new(),
            forms: Vec::new(),
            text: collapse_whitespace(body),
        }
    }

    pub fn parse(url: &str, html: &str) -> Self {
        let document = Html::parse_document(html);
        let base = Url::parse(url).ok();

        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| {
                document
                    .select(&sel)
                    .next()
                    .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            })
            .unwrap_or_default();

        let mut form_positions = HashMap::new();
        let mut forms = Vec::new();
        if let Ok(sel) = Selector::parse("form") {
            for (i, form) in document.select(&sel).enumerate() {
                form_positions.insert(form.id(), i);
                forms.push(Form {
                    action: resolve(base.as_ref(), form.value().attr("action").unwrap_or(""))
                        .unwrap_or_else(|| url.to_string()),
                    method: match form.value().attr("method") {
                        Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
                        _ => FormMethod::Get,
                    },
                    fields: Vec::new(),
                });
            }
        }
        let form_of = |el: &ElementRef| -> Option<usize> {
            el.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "form")
                .and_then(|f| form_positions.get(&f.id()).copied())
        };

        // Hidden inputs carry form state but are not addressable.
        if let Ok(sel) = Selector::parse("input[type=hidden]") {
            for input in document.select(&sel) {
                let (Some(form), Some(name)) = (form_of(&input), input.value().attr("name")) else {
                    continue;
                };
                forms[form].fields.push(FormField {
                    name: name.into(),
                    default: Some(input.value().attr("value").unwrap_or("").into()),
                    element: None,
                    toggle: false,
                    checked_by_default: false,
                });
            }
        }

        let mut elements = Vec::new();
        if let Ok(sel) = Selector::parse(INTERACTIVE) {
            for el in document.select(&sel) {
                let node = el.value();
                if node.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
                    || is_hidden(&el)
                {
                    continue;
                }

                let tag = node.name().to_string();
                let input_type = node.attr("type").unwrap_or("").to_ascii_lowercase();
                let form = form_of(&el);
                let position = elements.len();

                let kind = match tag.as_str() {
                    "a" => match node.attr("href").and_then(|h| resolve(base.as_ref(), h)) {
                        Some(href) => ElementKind::Link {
                            href,
                            new_tab: node.attr("target") == Some("_blank"),
                        },
                        None => ElementKind::Other,
                    },
                    "button" if input_type.is_empty() || input_type == "submit" => {
                        ElementKind::Submit {
                            form,
                            name: node.attr("name").map(String::from),
                            value: node.attr("value").map(String::from),
                        }
                    }
                    "input" if matches!(input_type.as_str(), "submit" | "image") => {
                        ElementKind::Submit {
                            form,
                            name: node.attr("name").map(String::from),
                            value: node.attr("value").map(String::from),
                        }
                    }
                    "input" if matches!(input_type.as_str(), "checkbox" | "radio") => {
                        ElementKind::Toggle {
                            form,
                            radio_group: (input_type == "radio")
                                .then(|| node.attr("name").map(String::from))
                                .flatten(),
                        }
                    }
                    "input" if matches!(input_type.as_str(), "button" | "reset") => ElementKind::Other,
                    "input" | "textarea" | "select" => ElementKind::TextField { form },
                    _ => ElementKind::Other,
                };

                if let (Some(form), Some(name)) = (form, node.attr("name")) {
                    match &kind {
                        ElementKind::TextField { .. } => forms[form].fields.push(FormField {
                            name: name.into(),
                            default: field_default(&el),
                            element: Some(position),
                            toggle: false,
                            checked_by_default: false,
                        }),
                        ElementKind::Toggle { .. } => forms[form].fields.push(FormField {
                            name: name.into(),
                            default: Some(node.attr("value").unwrap_or("on").into()),
                            element: Some(position),
                            toggle: true,
                            checked_by_default: node.attr("checked").is_some(),
                        }),
                        _ => {}
                    }
                }

                let mut attributes = BTreeMap::new();
                for key in SHOWN_ATTRIBUTES {
                    if let Some(value) = node.attr(key) {
                        let value = if *key == "href" {
                            resolve(base.as_ref(), value).unwrap_or_else(|| value.to_string())
                        } else {
                            value.to_string()
                        };
                        if !value.is_empty() {
                            attributes.insert((*key).to_string(), value);
                        }
                    }
                }

                elements.push(PageElement {
                    role: node
                        .attr("role")
                        .map(String::from)
                        .or_else(|| implied_role(&tag, &input_type).map(String::from)),
                    text: truncate(&collapse_whitespace(&el.text().collect::<String>()), MAX_ELEMENT_TEXT),
                    structural_hash: structural_hash(&el),
                    attributes,
                    kind,
                    tag,
                });
            }
        }

        Self {
            url: url.into(),
            title,
            elements,
            forms,
            text: visible_text(&document),
        }
    }
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Url::parse(href).ok().map(String::from),
    }
}

fn implied_role(tag: &str, input_type: &str) -> Option<&'static str> {
    match (tag, input_type) {
        ("a", _) => Some("link"),
        ("button", _) => Some("button"),
        ("input", "submit" | "button" | "reset" | "image") => Some("button"),
        ("input", "checkbox") => Some("checkbox"),
        ("input", "radio") => Some("radio"),
        ("input", _) | ("textarea", _) => Some("textbox"),
        ("select", _) => Some("combobox"),
        _ => None,
    }
}

fn field_default(el: &ElementRef) -> Option<String> {
    match el.value().name() {
        "textarea" => Some(el.text().collect()),
        "select" => {
            let options = Selector::parse("option").ok()?;
            let mut first = None;
            for option in el.select(&options) {
                let value = option
                    .value()
                    .attr("value")
                    .map(String::from)
                    .unwrap_or_else(|| collapse_whitespace(&option.text().collect::<String>()));
                if option.value().attr("selected").is_some() {
                    return Some(value);
                }
                first.get_or_insert(value);
            }
            first
        }
        _ => Some(el.value().attr("value").unwrap_or("").into()),
    }
}

fn is_hidden(el: &ElementRef) -> bool {
    std::iter::once(*el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| {
            e.value().attr("hidden").is_some()
                || e.value().attr("style").is_some_and(|s| {
                    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
                    s.to_ascii_lowercase().contains("display:none")
                })
        })
}

/// SHA-256 over tag, DOM path and stable attributes.
fn structural_hash(el: &ElementRef) -> String {
    let mut path: Vec<String> = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .map(|a| path_segment(&a))
        .collect();
    path.reverse();
    path.push(path_segment(el));

    let mut hasher = Sha256::new();
    hasher.update(el.value().name().as_bytes());
    hasher.update(b"|");
    hasher.update(path.join(">").as_bytes());
    for key in STABLE_ATTRIBUTES {
        if let Some(value) = el.value().attr(key) {
            hasher.update(format!("|{key}={value}").as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// `tag[n]`, where n counts earlier siblings with the same tag.
fn path_segment(el: &ElementRef) -> String {
    let tag = el.value().name();
    let position = el
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|s| s.value().name() == tag)
        .count();
    format!("{tag}[{position}]")
}

fn visible_text(document: &Html) -> String {
    const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "head"];
    let mut parts = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| SKIPPED.contains(&a.value().name()) || is_hidden(&a));
        if !skipped && !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    collapse_whitespace(&parts.join(" "))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
