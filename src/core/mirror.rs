//! Mirror engine (spec §4.G): the aggregate of all repos in one manifest.

use tracing::{info, instrument, warn};

use crate::core::manifest::MirrorConfig;
use crate::core::repo::Repo;
use crate::core::state::MirrorState;
use crate::error::Result;
use crate::path::AbsDir;

pub struct Mirror {
    repos: Vec<Repo>,
}

impl Mirror {
    pub fn from_config(config: &MirrorConfig, cache_root: &AbsDir) -> Self {
        let repos = config
            .repos
            .iter()
            .cloned()
            .map(|spec| Repo::new(spec, cache_root.clone()))
            .collect();
        Self { repos }
    }

    pub fn repos(&self) -> &[Repo] {
        &self.repos
    }

    /// Checkout every repo, in manifest order, no parallelism within a run
    /// (spec §4.G, §5 "Ordering guarantees").
    #[instrument(skip(self))]
    pub fn checkout_all(&self) -> Result<()> {
        for repo in &self.repos {
            repo.checkout()?;
        }
        Ok(())
    }

    fn prior_for<'a>(&self, state: &'a MirrorState, repo: &Repo) -> Option<&'a crate::core::state::RepoState> {
        state
            .repos
            .iter()
            .find(|r| r.source.canonical() == repo.source().canonical())
    }

    /// `check()`: checkout-all, then report per-file outcome. Returns
    /// `true` iff every file in every repo is up to date (spec §4.G, §8
    /// scenario 2/3).
    #[instrument(skip(self, state))]
    pub fn check(&self, state: &MirrorState) -> Result<bool> {
        self.checkout_all()?;
        let mut all_ok = true;
        for repo in &self.repos {
            let prior = self.prior_for(state, repo);
            for status in repo.all_up_to_date(prior)? {
                if status.up_to_date {
                    info!("{}", status.explanation);
                } else {
                    warn!("{}", status.explanation);
                    all_ok = false;
                }
            }
        }
        if all_ok {
            info!("All up to date!");
        }
        Ok(all_ok)
    }

    /// `update_all(target)`: update every repo in manifest order; any
    /// error aborts the remainder (spec §4.G).
    #[instrument(skip(self, state, target))]
    pub fn update_all(&self, state: &MirrorState, target: &AbsDir) -> Result<()> {
        for repo in &self.repos {
            let prior = self.prior_for(state, repo);
            repo.update(prior, target)?;
        }
        Ok(())
    }

    /// The new state to record after a successful run.
    pub fn state(&self) -> Result<MirrorState> {
        let mut repos = Vec::with_capacity(self.repos.len());
        for repo in &self.repos {
            repos.push(repo.state()?);
        }
        Ok(MirrorState { repos })
    }
}
