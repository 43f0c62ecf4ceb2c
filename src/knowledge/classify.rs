//! Keyword-based domain classification.

use super::types::DomainTag;
use crate::embedding::tfidf::tokenize;

/// Keywords shorter than this match whole tokens only.
const PREFIX_MIN_CHARS: usize = 4;

/// Fixed keyword sets, listed in tie-break precedence order.
///
/// Multi-word keywords match as contiguous token runs, so `ci/cd` matches
/// "CI/CD" and "ci cd" alike.
pub const DOMAIN_KEYWORDS: [(DomainTag, &[&str]); 5] = [
    (
        DomainTag::Security,
        &[
            "auth", "jwt", "token", "encrypt", "password", "cors", "csrf", "xss",
            "injection", "vulnerability", "permission",
        ],
    ),
    (
        DomainTag::Devops,
        &[
            "docker", "kubernetes", "ci/cd", "deploy", "terraform", "ansible", "pipeline",
            "github actions", "cloudflare", "nginx",
        ],
    ),
    (
        DomainTag::Backend,
        &[
            "api", "endpoint", "database", "sql", "server", "fastapi", "flask", "django",
            "route", "middleware", "orm", "migration",
        ],
    ),
    (
        DomainTag::Frontend,
        &[
            "react", "vue", "angular", "css", "html", "component", "ui", "ux", "tailwind",
            "styled", "dom", "browser", "jsx", "tsx",
        ],
    ),
    (
        DomainTag::Testing,
        &[
            "test", "pytest", "jest", "mock", "fixture", "coverage", "assert", "spec", "e2e",
            "integration",
        ],
    ),
];

/// Tag `content` with the domain whose keyword set has the most hits.
///
/// Case-insensitive. A keyword of four or more characters matches any token
/// it starts, so "deploy" catches "deployment" and "auth" catches
/// "authorization". Shorter keywords ("ui", "api") match whole tokens, with a
/// trailing plural `s` tolerated. Ties go to the earlier entry of
/// [`DOMAIN_KEYWORDS`]; no hits at all gives [`DomainTag::General`].
pub fn classify(content: &str) -> DomainTag {
    let tokens = tokenize(content);
    if tokens.is_empty() {
        return DomainTag::General;
    }

    let mut best = DomainTag::General;
    let mut best_hits = 0;
    for (tag, keywords) in DOMAIN_KEYWORDS {
        let hits = keywords
            .iter()
            .filter(|kw| contains_keyword(&tokens, kw))
            .count();
        // Strictly greater: earlier entries win ties.
        if hits > best_hits {
            best = tag;
            best_hits = hits;
        }
    }
    best
}

fn contains_keyword(tokens: &[String], keyword: &str) -> bool {
    let parts = tokenize(keyword);
    if parts.is_empty() || parts.len() > tokens.len() {
        return false;
    }
    tokens.windows(parts.len()).any(|window| {
        window
            .iter()
            .zip(&parts)
            .all(|(token, part)| token_matches(token, part))
    })
}

fn token_matches(token: &str, part: &str) -> bool {
    if part.chars().count() >= PREFIX_MIN_CHARS {
        token.starts_with(part)
    } else {
        token == part || token.strip_suffix('s') == Some(part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_domain_matches() {
        assert_eq!(classify("React component re-renders twice"), DomainTag::Frontend);
        assert_eq!(classify("Terraform apply hangs on nginx"), DomainTag::Devops);
        assert_eq!(classify("SQL migration fails on the orm"), DomainTag::Backend);
        assert_eq!(classify("pytest fixture not found"), DomainTag::Testing);
        assert_eq!(classify("Fix: JWT refresh needs 30s timeout"), DomainTag::Security);
    }

    #[test]
    fn no_keywords_is_general() {
        assert_eq!(classify("the weather was nice today"), DomainTag::General);
        assert_eq!(classify(""), DomainTag::General);
    }

    #[test]
    fn case_insensitive_and_plural() {
        assert_eq!(classify("DOCKER containers restart"), DomainTag::Devops);
        assert_eq!(classify("two new endpoints"), DomainTag::Backend);
    }

    #[test]
    fn multi_word_keywords_match_as_runs() {
        assert_eq!(classify("GitHub Actions run is red"), DomainTag::Devops);
        assert_eq!(classify("CI/CD stuck"), DomainTag::Devops);
        assert_eq!(classify("github broke the actions"), DomainTag::General);
    }

    #[test]
    fn keywords_do_not_match_inside_words() {
        // "ui" inside "build", "api" inside "rapid".
        assert_eq!(classify("rapid build"), DomainTag::General);
        assert_eq!(classify("a redeployed uitest"), DomainTag::General);
    }

    #[test]
    fn longer_keywords_match_word_forms() {
        assert_eq!(classify("deployment failed overnight"), DomainTag::Devops);
        assert_eq!(classify("unit testing is flaky"), DomainTag::Testing);
        assert_eq!(classify("authorization header missing"), DomainTag::Security);
        assert_eq!(classify("authentication loop after logout"), DomainTag::Security);
        assert_eq!(classify("router returns 404 for nested paths"), DomainTag::Backend);
        assert_eq!(classify("mocked clock drifts"), DomainTag::Testing);
    }

    #[test]
    fn ties_follow_precedence() {
        // One hit each.
        assert_eq!(classify("jwt docker"), DomainTag::Security);
        assert_eq!(classify("docker api"), DomainTag::Devops);
        assert_eq!(classify("api css"), DomainTag::Backend);
        assert_eq!(classify("css jest"), DomainTag::Frontend);
    }

    #[test]
    fn most_hits_beats_precedence() {
        assert_eq!(
            classify("jest mock coverage for the login password"),
            DomainTag::Testing
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "CORS error from the API server in the browser";
        assert_eq!(classify(text), classify(text));
    }
}
