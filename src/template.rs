use crate::error::TemplateError;
use crate::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declares how request paths map to resources of one type.
///
/// `path` is a `/`-separated pattern where a segment is either a literal or a whole-segment
/// variable such as `{id}`. `name` may reference the same variables and yields the resource name,
/// which must be unique per concrete resource.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResourceTemplate {
    pub path: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
}

impl ResourceTemplate {
    pub fn new(
        path: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

/// Ordered set of resource templates. The first template matching a path wins.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct ResourceTemplates(pub Vec<ResourceTemplate>);

impl ResourceTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, template: ResourceTemplate) -> Self {
        self.0.push(template);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ResourceTemplate> for ResourceTemplates {
    fn from_iter<I: IntoIterator<Item = ResourceTemplate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A validated template, ready for matching.
#[derive(Debug, Clone)]
pub(crate) struct CompiledTemplate {
    path: String,
    segments: Vec<Segment>,
    name: String,
    resource_type: ResourceType,
}

impl CompiledTemplate {
    fn compile(
        template: &ResourceTemplate,
        types: &HashMap<String, ResourceType>,
    ) -> Result<Self, TemplateError> {
        let invalid = |reason| TemplateError::InvalidPath {
            path: template.path.clone(),
            reason,
        };

        let Some(rest) = template.path.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };

        let mut segments = Vec::new();
        for raw in split_segments(rest) {
            let segment = match (raw.strip_prefix('{'), raw.ends_with('}')) {
                (Some(inner), true) => {
                    let variable = &inner[..inner.len() - 1];
                    if variable.is_empty() || variable.contains(is_brace) {
                        return Err(invalid("variable must be a non-empty '{name}' segment"));
                    }
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Variable(v) if v == variable))
                    {
                        return Err(invalid("variable appears more than once"));
                    }
                    Segment::Variable(variable.to_owned())
                }
                _ if raw.contains(is_brace) => {
                    return Err(invalid("variable must span a whole segment"));
                }
                _ if raw.is_empty() => return Err(invalid("empty segment")),
                _ => Segment::Literal(raw.to_owned()),
            };
            segments.push(segment);
        }

        let resource_type = types.get(&template.resource_type).cloned().ok_or_else(|| {
            TemplateError::UnknownResourceType {
                path: template.path.clone(),
                resource_type: template.resource_type.clone(),
            }
        })?;

        for variable in name_variables(&template.name) {
            if !segments
                .iter()
                .any(|s| matches!(s, Segment::Variable(v) if v == variable))
            {
                return Err(TemplateError::UnknownVariable {
                    path: template.path.clone(),
                    name: template.name.clone(),
                    variable: variable.to_owned(),
                });
            }
        }

        Ok(Self {
            path: template.path.clone(),
            segments,
            name: template.name.clone(),
            resource_type,
        })
    }

    /// Matches path segments, returning variable bindings.
    fn bind<'a>(&self, segments: &[&'a str]) -> Option<Vec<(&str, &'a str)>> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut bindings = Vec::new();
        for (pattern, segment) in self.segments.iter().zip(segments) {
            match pattern {
                Segment::Literal(literal) if literal == segment => {}
                Segment::Literal(_) => return None,
                Segment::Variable(variable) => bindings.push((variable.as_str(), *segment)),
            }
        }
        Some(bindings)
    }

    /// Whether every path matched by `other` is also matched by `self`.
    fn covers(&self, other: &CompiledTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(mine, theirs)| match (mine, theirs) {
                    (Segment::Variable(_), _) => true,
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Literal(_), Segment::Variable(_)) => false,
                })
    }

    fn same_shape(&self, other: &CompiledTemplate) -> bool {
        self.covers(other) && other.covers(self)
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }
}

/// A successful template match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TemplateMatch {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CompiledTemplates(Vec<CompiledTemplate>);

impl CompiledTemplates {
    /// Validates `templates` against `types`.
    ///
    /// Two templates with the same shape are ambiguous, and a template whose paths are all claimed
    /// by an earlier one can never match. Both are rejected. Partial overlaps, such as `/users/me`
    /// before `/users/{id}`, are resolved by order.
    pub(crate) fn compile(
        templates: &ResourceTemplates,
        types: &HashMap<String, ResourceType>,
    ) -> Result<Self, TemplateError> {
        let mut compiled: Vec<CompiledTemplate> = Vec::with_capacity(templates.len());
        for template in &templates.0 {
            let template = CompiledTemplate::compile(template, types)?;
            for earlier in &compiled {
                if earlier.same_shape(&template) {
                    return Err(TemplateError::Ambiguous {
                        first: earlier.path.clone(),
                        second: template.path.clone(),
                    });
                }
                if earlier.covers(&template) {
                    return Err(TemplateError::Shadowed {
                        shadowed: template.path.clone(),
                        by: earlier.path.clone(),
                    });
                }
            }
            compiled.push(template);
        }
        Ok(Self(compiled))
    }

    /// Finds the first template matching `path` (relative to the base path).
    pub(crate) fn find(&self, path: &str) -> Option<(&CompiledTemplate, TemplateMatch)> {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        let segments: Vec<&str> = split_segments(trimmed).collect();
        self.0.iter().find_map(|template| {
            let bindings = template.bind(&segments)?;
            let matched = TemplateMatch {
                name: substitute(&template.name, &bindings),
                path: substitute_path(&template.segments, &bindings),
            };
            Some((template, matched))
        })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CompiledTemplate> {
        self.0.iter()
    }
}

fn is_brace(c: char) -> bool {
    c == '{' || c == '}'
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let mut segments = path.split('/');
    // "" splits into one empty segment, which is the root path.
    if path.is_empty() {
        segments.next();
    }
    segments
}

fn name_variables(name: &str) -> impl Iterator<Item = &str> {
    name.split('{')
        .skip(1)
        .filter_map(|chunk| chunk.split_once('}').map(|(variable, _)| variable))
}

fn substitute(template: &str, bindings: &[(&str, &str)]) -> String {
    bindings
        .iter()
        .fold(template.to_owned(), |name, (variable, value)| {
            name.replace(&format!("{{{}}}", variable), value)
        })
}

fn substitute_path(segments: &[Segment], bindings: &[(&str, &str)]) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        match segment {
            Segment::Literal(literal) => path.push_str(literal),
            Segment::Variable(variable) => {
                if let Some((_, value)) = bindings.iter().find(|(v, _)| v == variable) {
                    path.push_str(value);
                }
            }
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}
