use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.provider.base_url, "https://api.openai.com");
    assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.provider.embedding_model, "text-embedding-ada-002");
    assert_eq!(config.provider.embedding_dimension, 1536);
    assert_eq!(config.provider.chat_model, "gpt-4o-mini");
    assert_eq!(config.retrieval.top_k, 1);
    assert_eq!(
        config.retrieval.missing_parent_policy,
        MissingParentPolicy::Distinct
    );
    assert!(!config.server.expose_provider_errors);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.provider.base_url = "ftp://example.com".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.provider.base_url = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.embedding_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.embedding_dimension = 32;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.retry_attempts = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let toml_str = r#"
        [retrieval]
        top_k = 3
        missing_parent_policy = "collapse"
    "#;
    let config: Config = toml::from_str(toml_str).expect("should parse partial toml");

    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(
        config.retrieval.missing_parent_policy,
        MissingParentPolicy::Collapse
    );
    assert_eq!(config.provider, ProviderConfig::default());
}

#[test]
fn setter_validation() {
    let mut provider = ProviderConfig::default();

    assert!(
        provider
            .set_base_url("http://localhost:8080".to_string())
            .is_ok()
    );
    assert!(provider.set_embedding_model("embed-small".to_string()).is_ok());
    assert!(provider.set_chat_model("chat-large".to_string()).is_ok());
    assert!(provider.set_batch_size(128).is_ok());
    assert!(provider.set_embedding_dimension(768).is_ok());

    assert!(provider.set_base_url("ws://localhost".to_string()).is_err());
    assert!(provider.set_embedding_model(" ".to_string()).is_err());
    assert!(provider.set_batch_size(0).is_err());
    assert!(provider.set_batch_size(4096).is_err());
    assert!(provider.set_embedding_dimension(8192).is_err());

    assert_eq!(provider.base_url, "http://localhost:8080");
    assert_eq!(provider.batch_size, 128);

    let mut retrieval = RetrievalConfig::default();
    assert!(retrieval.set_top_k(5).is_ok());
    assert!(retrieval.set_top_k(101).is_err());
    assert_eq!(retrieval.top_k, 5);
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.provider, ProviderConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.provider.chat_model = "gpt-4o".to_string();
    config.retrieval.top_k = 2;
    config.index.storage_dir = Some(PathBuf::from("vectors"));

    config.save().expect("should save config");
    let loaded = Config::load(temp_dir.path()).expect("should load saved config");

    assert_eq!(config, loaded);
    assert_eq!(loaded.storage_path(), temp_dir.path().join("vectors"));
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[provider]\nbatch_size = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn path_resolution() {
    let config = Config {
        base_dir: PathBuf::from("/srv/icd"),
        ..Config::default()
    };
    assert_eq!(
        config.corpus_path(),
        PathBuf::from("/srv/icd/icd_codes_rag.jsonl")
    );
    assert_eq!(config.storage_path(), PathBuf::from("/srv/icd/storage"));

    let config = Config {
        base_dir: PathBuf::from("/srv/icd"),
        index: IndexConfig {
            corpus_path: Some(PathBuf::from("/data/codes.jsonl")),
            storage_dir: Some(PathBuf::from("idx")),
        },
        ..Config::default()
    };
    assert_eq!(config.corpus_path(), PathBuf::from("/data/codes.jsonl"));
    assert_eq!(config.storage_path(), PathBuf::from("/srv/icd/idx"));
}

#[test]
#[serial]
fn api_key_from_environment() {
    let provider = ProviderConfig {
        api_key_env: "ICD_RAG_TEST_API_KEY".to_string(),
        ..ProviderConfig::default()
    };

    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::remove_var("ICD_RAG_TEST_API_KEY") };
    assert!(matches!(
        provider.api_key(),
        Err(ConfigError::MissingApiKey(name)) if name == "ICD_RAG_TEST_API_KEY"
    ));

    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::set_var("ICD_RAG_TEST_API_KEY", "sk-test") };
    assert_eq!(provider.api_key().expect("key should be set"), "sk-test");

    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::remove_var("ICD_RAG_TEST_API_KEY") };
}

#[test]
#[serial]
fn config_dir_honors_override() {
    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::set_var(HOME_ENV_VAR, "/tmp/icd-rag-home") };
    assert_eq!(
        Config::config_dir().expect("should resolve config dir"),
        PathBuf::from("/tmp/icd-rag-home")
    );
    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::remove_var(HOME_ENV_VAR) };
}
