//! Iterative resolution engine
//!
//! Walks the namespace from the best cached delegation toward an
//! answer, folding every response back into the record cache so each
//! descent starts one step further down the chain.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::cache::{normalize_name, CacheEntry, RecordCache};
use crate::comm::{Connect, ServerRegistry, ServerRequest};
use crate::config::ResolverConfig;
use crate::error::Result;

/// One resolved record, in the externally returned form.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Normalized owner name.
    pub name: String,
    /// Record type of `data`.
    pub rtype: RecordType,
    /// Always `IN`.
    pub class: DNSClass,
    /// The record data.
    pub data: RData,
}

/// Outcome of querying the nameservers of one delegation level.
enum Step {
    /// The response carried answers; resolution is done.
    Answered(Vec<Answer>),
    /// Answerless referral ingested; retry one level deeper.
    Descend,
    /// No usable nameserver at this level.
    GiveUp,
}

/// The query entry point: a sharded record cache plus the registry of
/// per-nameserver channels, tied together by the iterative walk.
pub struct Resolver {
    cache: RecordCache,
    registry: ServerRegistry,
    query_timeout: Duration,
    record_ttl: Duration,
}

impl Resolver {
    /// Create a resolver with the default configuration.
    pub fn new(connector: Arc<dyn Connect>) -> Result<Self> {
        Self::with_config(ResolverConfig::default(), connector)
    }

    /// Create a resolver with explicit shard counts and timeouts.
    pub fn with_config(config: ResolverConfig, connector: Arc<dyn Connect>) -> Result<Self> {
        let cache = RecordCache::new(config.cache_shards)?;
        let registry = ServerRegistry::new(config.comm_shards, connector)?;

        log::info!(
            "resolver ready: {} cache shards, {} registry shards, {:?} per-server wait",
            config.cache_shards,
            config.comm_shards,
            config.query_timeout
        );

        Ok(Self {
            cache,
            registry,
            query_timeout: config.query_timeout,
            record_ttl: config.record_ttl,
        })
    }

    /// The record cache, for pre-seeding entries and for inspecting what
    /// a resolution left behind.
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Resolve `name`/`rtype` iteratively, starting from the best cached
    /// delegation.
    ///
    /// An empty slice is the sole failure signal; NXDOMAIN, SERVFAIL,
    /// timeouts, and a missing delegation chain all look the same to the
    /// caller.
    pub async fn query_lookup(&self, name: &str, rtype: RecordType) -> Vec<Answer> {
        let name = normalize_name(name);

        // CNAMEs are followed only as side effects of other lookups,
        // never answered directly.
        if rtype == RecordType::CNAME {
            return Vec::new();
        }

        // Every descent must move strictly deeper in the delegation
        // chain, so the dot count bounds the walk even against a
        // nameserver that keeps referring sideways.
        let max_depth = name.matches('.').count();
        for depth in 0..=max_depth {
            if let Some(entry) = self.cache.lookup(&name, rtype) {
                log::debug!("cache hit for {} {:?}", name, rtype);
                return entry
                    .data
                    .into_iter()
                    .map(|data| Answer {
                        name: name.clone(),
                        rtype,
                        class: DNSClass::IN,
                        data,
                    })
                    .collect();
            }

            let Some(ns_entry) = self.cache.best_ns(&name) else {
                return Vec::new();
            };

            match self.ask_delegation(&name, rtype, &ns_entry, depth).await {
                Step::Answered(answers) => return answers,
                Step::Descend => continue,
                Step::GiveUp => return Vec::new(),
            }
        }

        log::debug!("depth limit reached resolving {} {:?}", name, rtype);
        Vec::new()
    }

    /// Try the nameservers of one delegation level in stored order.
    async fn ask_delegation(
        &self,
        name: &str,
        rtype: RecordType,
        ns_entry: &CacheEntry,
        depth: usize,
    ) -> Step {
        for rdata in &ns_entry.data {
            let RData::NS(ns) = rdata else { continue };
            let nsname = normalize_name(&ns.0.to_string());

            // A delegation is only usable with glue already cached;
            // without it we abandon the query rather than chase the
            // nameserver's own address.
            let Some(glue) = self.cache.lookup(&nsname, RecordType::A) else {
                log::debug!("no glue for nameserver {}", nsname);
                return Step::GiveUp;
            };
            let Some(addr) = first_v4(&glue) else {
                log::debug!("no address in glue for nameserver {}", nsname);
                return Step::GiveUp;
            };

            let comm = self.registry.get(addr);
            let (tx, rx) = oneshot::channel();
            let request = ServerRequest {
                name: name.to_string(),
                qtype: rtype,
                response: tx,
            };
            if comm.requests.send(request).await.is_err() {
                // The multiplexer's pump is gone; same as a dead server.
                log::debug!("request queue for {} is closed", addr);
                continue;
            }

            let message = match timeout(self.query_timeout, rx).await {
                Ok(Ok(message)) => message,
                Ok(Err(_)) | Err(_) => {
                    log::debug!(
                        "no response from {} for {} within {:?} (depth {})",
                        addr,
                        name,
                        self.query_timeout,
                        depth
                    );
                    continue;
                }
            };

            self.ingest(&message);

            if !message.answers().is_empty() {
                return Step::Answered(message.answers().iter().map(answer_from_record).collect());
            }

            // Answerless referral: the ingest above moved the best known
            // delegation one level closer to the answer.
            return Step::Descend;
        }
        Step::GiveUp
    }

    /// Fold every record of a response into the cache, one entry per
    /// record, with the fixed ingest TTL.
    fn ingest(&self, message: &Message) {
        let expires = Instant::now() + self.record_ttl;
        let sections = message
            .answers()
            .iter()
            .chain(message.name_servers())
            .chain(message.additionals());
        for record in sections {
            self.cache.set(
                &record.name().to_string(),
                record.record_type(),
                expires,
                vec![record.data().clone()],
            );
        }
    }
}

fn first_v4(glue: &CacheEntry) -> Option<IpAddr> {
    glue.data.iter().find_map(|data| match data {
        RData::A(a) => Some(IpAddr::V4(a.0)),
        _ => None,
    })
}

fn answer_from_record(record: &Record) -> Answer {
    Answer {
        name: normalize_name(&record.name().to_string()),
        rtype: record.record_type(),
        class: DNSClass::IN,
        data: record.data().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::Name;
    use std::net::Ipv4Addr;

    #[test]
    fn test_answers_use_normalized_names() {
        let record = Record::from_rdata(
            Name::from_ascii("FOO.Com.").unwrap(),
            60,
            RData::A(A(Ipv4Addr::new(1, 2, 3, 4))),
        );

        let answer = answer_from_record(&record);
        assert_eq!(answer.name, "foo.com");
        assert_eq!(answer.rtype, RecordType::A);
        assert_eq!(answer.class, DNSClass::IN);
    }

    #[test]
    fn test_first_v4_skips_other_data() {
        let entry = CacheEntry {
            expires: Instant::now() + Duration::from_secs(60),
            data: vec![
                RData::NS(hickory_proto::rr::rdata::NS(
                    Name::from_ascii("ns.example.").unwrap(),
                )),
                RData::A(A(Ipv4Addr::new(9, 9, 9, 9))),
            ],
        };

        assert_eq!(
            first_v4(&entry),
            Some(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)))
        );
    }
}
