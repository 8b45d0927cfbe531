use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use url::Url;

/// Query parameter carrying the token.
pub const PARAM: &str = "cachebuster";
pub const TOKEN_LEN: usize = 10;

/// Random token source, seeded once and handed around explicitly.
pub struct CacheBuster {
    rng: StdRng,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn token(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect()
    }
}

impl Default for CacheBuster {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends the token to `base`, keeping whatever query it already has.
pub fn apply(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(PARAM, token);
    url
}

/// Removes every cache-buster pair so the URL reads like the one the user typed.
pub fn strip(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}
