mod yaml;

pub use yaml::YamlConfigFrontend;
