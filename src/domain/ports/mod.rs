mod dataset_source;
mod dns_provider;
mod domain_resolver;
mod rule_store;

pub use dataset_source::DatasetSource;
pub use dns_provider::DnsProvider;
pub use domain_resolver::DomainResolver;
pub use rule_store::RuleStore;
