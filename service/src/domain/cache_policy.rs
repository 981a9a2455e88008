use crate::domain::image_path::ImagePath;
use crate::domain::ImageSource;
use crate::repository::ImageMetadata;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

const ONE_YEAR: u64 = 31_536_000;
const ONE_MONTH: u64 = 2_592_000;
const ONE_WEEK: u64 = 604_800;
const ONE_DAY: u64 = 86_400;
const FIVE_MINUTES: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    Static,
    Dynamic,
    Critical,
    Development,
    Error,
}

impl CacheDirective {
    pub const ALL: [CacheDirective; 5] = [
        CacheDirective::Static,
        CacheDirective::Dynamic,
        CacheDirective::Critical,
        CacheDirective::Development,
        CacheDirective::Error,
    ];

    pub fn policy(&self) -> CachePolicy {
        let base = CachePolicy {
            public: true,
            max_age: 0,
            shared_max_age: None,
            stale_while_revalidate: None,
            immutable: false,
            must_revalidate: false,
            no_cache: false,
            no_store: false,
        };
        match self {
            CacheDirective::Static => CachePolicy {
                max_age: ONE_YEAR,
                immutable: true,
                ..base
            },
            CacheDirective::Critical => CachePolicy {
                max_age: ONE_WEEK,
                stale_while_revalidate: Some(ONE_MONTH),
                ..base
            },
            CacheDirective::Dynamic => CachePolicy {
                max_age: ONE_DAY,
                stale_while_revalidate: Some(ONE_WEEK),
                ..base
            },
            CacheDirective::Development => CachePolicy {
                public: false,
                must_revalidate: true,
                no_cache: true,
                no_store: true,
                ..base
            },
            // Short-lived so a recovered upstream is picked up quickly. Carries
            // no `no-cache`, which would contradict the positive max-age.
            CacheDirective::Error => CachePolicy {
                max_age: FIVE_MINUTES,
                must_revalidate: true,
                ..base
            },
        }
    }
}

impl Display for CacheDirective {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CacheDirective::Static => "static",
            CacheDirective::Dynamic => "dynamic",
            CacheDirective::Critical => "critical",
            CacheDirective::Development => "development",
            CacheDirective::Error => "error",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("`{flag}` cannot be combined with max-age={max_age}")]
    ConflictingFreshness { flag: &'static str, max_age: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub public: bool,
    pub max_age: u64,
    pub shared_max_age: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    pub immutable: bool,
    pub must_revalidate: bool,
    pub no_cache: bool,
    pub no_store: bool,
}

impl CachePolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        let fresh_for = self.max_age.max(self.shared_max_age.unwrap_or(0));
        if fresh_for > 0 {
            if self.no_store {
                return Err(PolicyError::ConflictingFreshness { flag: "no-store", max_age: fresh_for });
            }
            if self.no_cache {
                return Err(PolicyError::ConflictingFreshness { flag: "no-cache", max_age: fresh_for });
            }
        }
        Ok(())
    }

    /// Renders the `Cache-Control` value. A policy that fails validation is never rendered.
    pub fn render(&self) -> Result<String, PolicyError> {
        self.validate()?;

        let mut parts: Vec<String> = Vec::new();
        if self.public {
            parts.push("public".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        parts.push(format!("max-age={}", self.max_age));
        if let Some(s_maxage) = self.shared_max_age {
            parts.push(format!("s-maxage={s_maxage}"));
        }
        if let Some(swr) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={swr}"));
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        Ok(parts.join(", "))
    }
}

/// What happened to a request, as far as caching is concerned.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Served { source: ImageSource, path: &'a ImagePath },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    pub directive: CacheDirective,
    pub cache_control: String,
    pub expires: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy {
    environment: Environment,
}

impl HeaderPolicy {
    pub fn new(environment: Environment) -> HeaderPolicy {
        HeaderPolicy { environment }
    }

    /// First match wins: error, development, critical, static, dynamic.
    pub fn directive_for(&self, outcome: Outcome<'_>) -> CacheDirective {
        match outcome {
            Outcome::Failed => CacheDirective::Error,
            _ if self.environment.is_development() => CacheDirective::Development,
            Outcome::Served { path, .. } if path.is_critical() => CacheDirective::Critical,
            Outcome::Served { source, path } if path.is_static_asset() || source == ImageSource::Remote => {
                CacheDirective::Static
            }
            Outcome::Served { .. } => CacheDirective::Dynamic,
        }
    }

    pub fn compute(
        &self,
        outcome: Outcome<'_>,
        metadata: Option<&ImageMetadata>,
    ) -> Result<CacheHeaders, PolicyError> {
        self.compute_at(outcome, metadata, Utc::now())
    }

    pub fn compute_at(
        &self,
        outcome: Outcome<'_>,
        metadata: Option<&ImageMetadata>,
        now: DateTime<Utc>,
    ) -> Result<CacheHeaders, PolicyError> {
        let directive = self.directive_for(outcome);
        let policy = directive.policy();
        let cache_control = policy.render()?;

        let max_age = i64::try_from(policy.max_age).unwrap_or(i64::MAX);
        let expires_at = TimeDelta::try_seconds(max_age)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now);

        Ok(CacheHeaders {
            directive,
            cache_control,
            expires: http_date(expires_at),
            etag: metadata.and_then(|m| m.etag.clone()),
            last_modified: metadata.and_then(|m| m.last_modified).map(http_date),
        })
    }
}

pub fn http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}
