mod doh_provider;
mod file_rule_store;
mod http_dataset_source;

pub use doh_provider::{build_query, client_subnet_option, parse_response, DohProvider};
pub use file_rule_store::{parse_rule_list, FileRuleStore};
pub use http_dataset_source::HttpDatasetSource;
