//! Request tag grammar
//!
//! A targeted request carries its target key as a query parameter on the
//! resource part of the request, e.g. `./app.js?babelTarget=legacy`. The
//! parameter is placed before any `#fragment` and joined with `&` when the
//! request already has a query. Loader prefixes (`a-loader!./x.js`) are
//! left alone; only the text after the last `!` is inspected.

use serde::{Deserialize, Serialize};

/// Default query parameter carrying the target key
pub const DEFAULT_TAG_PARAM: &str = "babelTarget";

/// Encodes and detects target tags in request strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSyntax {
    param: String,
}

/// A request split around its query and fragment
struct RequestParts<'a> {
    /// Everything before the query (loader prefix and path)
    head: &'a str,
    /// Query without the leading `?`
    query: Option<&'a str>,
    /// Fragment including the leading `#`
    fragment: &'a str,
}

impl<'a> RequestParts<'a> {
    fn split(request: &'a str) -> Self {
        let resource_start = request.rfind('!').map_or(0, |i| i + 1);
        let resource = &request[resource_start..];

        let query_at = resource.find('?').map(|i| resource_start + i);
        let fragment_search_from = query_at.unwrap_or(resource_start);
        let fragment_at = request[fragment_search_from..]
            .find('#')
            .map(|i| fragment_search_from + i)
            .unwrap_or(request.len());

        match query_at {
            Some(q) if q < fragment_at => Self {
                head: &request[..q],
                query: Some(&request[q + 1..fragment_at]),
                fragment: &request[fragment_at..],
            },
            _ => Self {
                head: &request[..fragment_at],
                query: None,
                fragment: &request[fragment_at..],
            },
        }
    }
}

impl TagSyntax {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }

    /// Query parameter name
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Extract the tagged target key, if the request carries one
    pub fn parse<'a>(&self, request: &'a str) -> Option<&'a str> {
        let query = RequestParts::split(request).query?;
        query.split('&').find_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            (name == self.param && !value.is_empty()).then_some(value)
        })
    }

    /// Whether the request already carries a tag
    pub fn is_tagged(&self, request: &str) -> bool {
        self.parse(request).is_some()
    }

    /// Tag `request` with `key`. An already-tagged request is returned unchanged.
    pub fn apply(&self, request: &str, key: &str) -> String {
        if self.is_tagged(request) {
            return request.to_string();
        }
        let parts = RequestParts::split(request);
        let query = match parts.query {
            None => format!("?{}={}", self.param, key),
            Some(q) if q.is_empty() || q.ends_with('&') => {
                format!("?{}{}={}", q, self.param, key)
            }
            Some(q) => format!("?{}&{}={}", q, self.param, key),
        };
        format!("{}{}{}", parts.head, query, parts.fragment)
    }

    /// Remove any tag from `request`, keeping the rest of its query
    pub fn strip(&self, request: &str) -> String {
        if !self.is_tagged(request) {
            return request.to_string();
        }
        let parts = RequestParts::split(request);
        let Some(query) = parts.query else {
            return request.to_string();
        };
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| pair.split_once('=').map_or(true, |(name, _)| name != self.param))
            .filter(|pair| !pair.is_empty())
            .collect();
        if kept.is_empty() {
            format!("{}{}", parts.head, parts.fragment)
        } else {
            format!("{}?{}{}", parts.head, kept.join("&"), parts.fragment)
        }
    }

    /// Module id with target tags removed, so equivalent modules built for
    /// different targets compare equal
    pub fn normalize_module_id(&self, id: &str) -> String {
        self.strip(id)
    }
}

impl Default for TagSyntax {
    fn default() -> Self {
        Self::new(DEFAULT_TAG_PARAM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_plain_request() {
        let tag = TagSyntax::default();
        assert_eq!(tag.apply("./app.js", "legacy"), "./app.js?babelTarget=legacy");
    }

    #[test]
    fn test_apply_with_existing_query_and_fragment() {
        let tag = TagSyntax::default();
        assert_eq!(
            tag.apply("./a.js?raw#frag", "modern"),
            "./a.js?raw&babelTarget=modern#frag"
        );
        assert_eq!(tag.apply("./a.js#frag", "modern"), "./a.js?babelTarget=modern#frag");
        assert_eq!(tag.apply("./a.js?", "modern"), "./a.js?babelTarget=modern");
    }

    #[test]
    fn test_loader_prefix_query_is_ignored() {
        let tag = TagSyntax::default();
        let request = "x-loader?babelTarget=legacy!./a.js";
        assert_eq!(tag.parse(request), None);
        assert_eq!(
            tag.apply(request, "modern"),
            "x-loader?babelTarget=legacy!./a.js?babelTarget=modern"
        );
    }

    #[test]
    fn test_parse_ignores_similar_params() {
        let tag = TagSyntax::default();
        assert_eq!(tag.parse("./a.js?babelTargetX=legacy"), None);
        assert_eq!(tag.parse("./a.js?babelTarget="), None);
        assert_eq!(tag.parse("./a.js?x=1&babelTarget=es5"), Some("es5"));
    }

    #[test]
    fn test_strip() {
        let tag = TagSyntax::default();
        assert_eq!(tag.strip("./a.js?babelTarget=legacy"), "./a.js");
        assert_eq!(tag.strip("./a.js?x=1&babelTarget=legacy#f"), "./a.js?x=1#f");
        assert_eq!(tag.strip("./a.js"), "./a.js");
    }

    #[test]
    fn test_custom_param() {
        let tag = TagSyntax::new("target");
        assert_eq!(tag.apply("./a.js", "es2015"), "./a.js?target=es2015");
        assert_eq!(tag.parse("./a.js?target=es2015"), Some("es2015"));
        assert_eq!(tag.normalize_module_id("./a.js?target=es2015"), "./a.js");
    }
}
