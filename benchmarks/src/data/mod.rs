mod synthetic_links;

pub use synthetic_links::SyntheticLinks;
