//! Endpoint wrappers for the console API.
//!
//! Every cached endpoint goes through [`CachedFetch`]: the wrapper builds the
//! request URL, picks the cache predicate, validates the payload and leaves
//! de-duplication, TTL handling and error reporting to the decorator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assist_cache::{
    BusyIndicator, CacheConfig, CacheStore, CachedFetch, CancellableOperation, ErrorCallback,
    ErrorOptions, ErrorReporter, EventBus, FetchOptions, FileStorage, InvalidationResult,
    KeyedCache, MemoryStorage, Namespace, RequestQueue, SettingsStore, Storage,
};
use assist_core::envelope::{self, generic_cache_condition, is_missing_entity};
use assist_core::{CacheType, FetchError, FetchResult, Identity, SourceType};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpTransport, Transport};

pub const HDFS_API_PREFIX: &str = "/filebrowser/view=/";
pub const ADLS_API_PREFIX: &str = "/filebrowser/view=adl:/";
pub const S3_API_PREFIX: &str = "/filebrowser/view=S3A://";
pub const GIT_API_PREFIX: &str = "/desktop/api/vcs/contents/";
pub const HBASE_API_PREFIX: &str = "/hbase/api/";
pub const AUTOCOMPLETE_API_PREFIX: &str = "/notebook/api/autocomplete/";
pub const TOP_TABLES_API: &str = "/metadata/api/optimizer/top_tables";
pub const SEARCH_API: &str = "/desktop/api/search/entities";

/// System database hidden from database listings.
const IMPALA_BUILTINS: &str = "_impala_builtins";

/// Default number of search results.
const DEFAULT_SEARCH_LIMIT: u32 = 100;

/// Per-call options shared by all endpoint wrappers.
#[derive(Clone, Default)]
pub struct CallOptions {
    pub silence_errors: bool,
    pub error_callback: Option<ErrorCallback>,
    pub timeout: Option<Duration>,
    pub refresh_cache: bool,
    pub cached_only: bool,
    pub busy: Option<Arc<dyn BusyIndicator>>,
}

impl CallOptions {
    pub fn silenced() -> Self {
        Self {
            silence_errors: true,
            ..Self::default()
        }
    }

    pub fn error_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn refresh_cache(mut self, refresh_cache: bool) -> Self {
        self.refresh_cache = refresh_cache;
        self
    }

    pub fn cached_only(mut self, cached_only: bool) -> Self {
        self.cached_only = cached_only;
        self
    }

    pub fn busy(mut self, busy: Arc<dyn BusyIndicator>) -> Self {
        self.busy = Some(busy);
        self
    }

    fn apply(&self, mut options: FetchOptions) -> FetchOptions {
        options.silence_errors = self.silence_errors;
        options.error_callback = self.error_callback.clone();
        options.timeout = self.timeout;
        options.refresh_cache = self.refresh_cache;
        options.cached_only = self.cached_only;
        options.busy = self.busy.clone();
        options
    }

    fn error_options(&self) -> ErrorOptions {
        ErrorOptions {
            silence: self.silence_errors,
            callback: self.error_callback.clone(),
        }
    }
}

impl std::fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("silence_errors", &self.silence_errors)
            .field("timeout", &self.timeout)
            .field("refresh_cache", &self.refresh_cache)
            .field("cached_only", &self.cached_only)
            .finish_non_exhaustive()
    }
}

/// A page of a file browser listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathListing {
    /// Path components; a leading `/` or empty component is ignored.
    pub path_parts: Vec<String>,
    /// 1-based page number (default: 1)
    pub page: Option<u32>,
    /// Page size, falls back to the client page size.
    pub page_size: Option<u32>,
    pub filter: Option<String>,
}

impl PathListing {
    pub fn new<I, S>(path_parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path_parts: path_parts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Splits a `/` separated path.
    pub fn from_path(path: &str) -> Self {
        Self::new(path.split('/').filter(|part| !part.is_empty()))
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Builds the listing URL below `prefix`.
    pub fn url(&self, prefix: &str, default_page_size: u32) -> String {
        let parts = match self.path_parts.split_first() {
            Some((first, rest)) if first == "/" || first.is_empty() => rest,
            _ => &self.path_parts[..],
        };

        let mut url = format!(
            "{}{}?format=json&sortby=name&descending=false&pagesize={}&pagenum={}",
            prefix,
            parts.join("/"),
            self.page_size.unwrap_or(default_page_size),
            self.page.unwrap_or(1),
        );
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            url.push_str("&filter=");
            url.push_str(&urlencoding::encode(filter));
        }
        url
    }

    fn is_filtered(&self) -> bool {
        self.filter.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// Kind of version control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitFileType {
    Dir,
    File,
}

impl GitFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::File => "file",
        }
    }
}

/// What [`ApiClient::clear_db_cache`] removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearDbCache {
    /// Clears the whole namespace of the source type.
    pub clear_all: bool,
    pub database: Option<String>,
    pub table: Option<String>,
    pub fields: Vec<String>,
    /// Explicit cache key, replacing the autocomplete URL built from the
    /// database, table and fields.
    pub key: Option<String>,
    /// Cache class of the namespace to clear.
    pub cache_type: CacheType,
}

impl ClearDbCache {
    pub fn all() -> Self {
        Self {
            clear_all: true,
            ..Self::default()
        }
    }

    pub fn database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    /// Cache key addressed by this request.
    pub fn cache_key(&self) -> String {
        if let Some(key) = &self.key {
            return key.clone();
        }
        let mut url = AUTOCOMPLETE_API_PREFIX.to_string();
        if let Some(database) = &self.database {
            url.push_str(database);
        }
        if let Some(table) = &self.table {
            url.push('/');
            url.push_str(table);
        }
        if !self.fields.is_empty() {
            url.push('/');
            url.push_str(&self.fields.join("/"));
        }
        url
    }
}

/// Metadata search query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: Value,
    pub limit: Option<u32>,
    pub raw_query: bool,
    pub sources: Option<Vec<String>>,
}

impl SearchQuery {
    pub fn new(query: impl Into<Value>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            raw_query: false,
            sources: None,
        }
    }

    fn into_request(self) -> HttpRequest {
        let sources = match self.sources {
            Some(sources) => Value::from(sources).to_string(),
            None => r#"["sql"]"#.to_string(),
        };
        HttpRequest::post(SEARCH_API)
            .field("query_s", self.query.to_string())
            .field("limit", self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).to_string())
            .field("raw_query", self.raw_query.to_string())
            .field("sources", sources)
    }
}

/// Client for the console API.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    fetcher: CachedFetch,
    settings: Arc<SettingsStore>,
    page_size: u32,
    last_known_databases: Arc<Mutex<HashMap<SourceType, Vec<String>>>>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        fetcher: CachedFetch,
        settings: Arc<SettingsStore>,
        page_size: u32,
    ) -> Self {
        Self {
            transport,
            fetcher,
            settings,
            page_size,
            last_known_databases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Builds a client from configuration. Errors are published on `bus`.
    pub fn from_config(config: &ClientConfig, bus: EventBus) -> Result<Self, ClientError> {
        let storage: Arc<dyn Storage> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::open(dir.clone())?),
            None => Arc::new(MemoryStorage::new()),
        };
        let transport = HttpTransport::new(config.base_url.clone(), config.request_timeout())?;
        let identity = config.identity();

        info!(
            base_url = %config.base_url,
            identity = %identity,
            persistent = config.storage_dir.is_some(),
            "Console client configured"
        );

        Ok(Self::with_storage(
            Arc::new(transport),
            storage,
            config.cache.clone(),
            identity,
            bus,
            config.page_size,
        ))
    }

    /// Assembles cache, queue and settings on top of `storage`.
    pub fn with_storage(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        cache: CacheConfig,
        identity: Identity,
        bus: EventBus,
        page_size: u32,
    ) -> Self {
        let cache = Arc::new(KeyedCache::new(Arc::clone(&storage), cache));
        let fetcher = CachedFetch::new(cache, RequestQueue::new(), identity.clone())
            .with_reporter(ErrorReporter::with_bus(bus));
        let settings = Arc::new(SettingsStore::new(storage, identity));
        Self::new(transport, fetcher, settings, page_size)
    }

    pub fn fetcher(&self) -> &CachedFetch {
        &self.fetcher
    }

    pub fn cache(&self) -> &Arc<KeyedCache> {
        self.fetcher.cache()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    // ---- File browsers ----

    #[instrument(skip_all, fields(path = ?listing.path_parts))]
    pub fn fetch_hdfs_path(&self, listing: PathListing, call: CallOptions) -> CancellableOperation<Arc<Value>> {
        self.fetch_listing(SourceType::Hdfs, HDFS_API_PREFIX, listing, call)
    }

    #[instrument(skip_all, fields(path = ?listing.path_parts))]
    pub fn fetch_adls_path(&self, listing: PathListing, call: CallOptions) -> CancellableOperation<Arc<Value>> {
        self.fetch_listing(SourceType::Adls, ADLS_API_PREFIX, listing, call)
    }

    #[instrument(skip_all, fields(path = ?listing.path_parts))]
    pub fn fetch_s3_path(&self, listing: PathListing, call: CallOptions) -> CancellableOperation<Arc<Value>> {
        self.fetch_listing(SourceType::S3, S3_API_PREFIX, listing, call)
    }

    fn fetch_listing(
        &self,
        source_type: SourceType,
        prefix: &str,
        listing: PathListing,
        call: CallOptions,
    ) -> CancellableOperation<Arc<Value>> {
        let url = listing.url(prefix, self.page_size);
        let filtered = listing.is_filtered();
        let options = call
            .apply(FetchOptions::new(source_type, url.clone()))
            .cache_condition(move |data| !filtered && file_count(data) > 2);

        let transport = Arc::clone(&self.transport);
        self.fetcher.run(options, move |store| {
            transport.send(HttpRequest::get(url)).and_then(move |data| {
                if has_error_field(&data) || envelope::is_error_response(&data) || !has_files(&data) {
                    return Err(FetchError::Backend(data));
                }
                store.store(&data);
                Ok(data)
            })
        })
    }

    #[instrument(skip_all, fields(path = ?path_parts, file_type = file_type.as_str()))]
    pub fn fetch_git_contents(
        &self,
        path_parts: &[String],
        file_type: GitFileType,
        call: CallOptions,
    ) -> CancellableOperation<Arc<Value>> {
        let url = format!(
            "{}?path={}&fileType={}",
            GIT_API_PREFIX,
            path_parts.join("/"),
            file_type.as_str()
        );
        let options = call
            .apply(FetchOptions::new(SourceType::Git, url.clone()))
            .cache_condition(|data| data["fileType"] == "dir" && file_count(data) > 2);

        let transport = Arc::clone(&self.transport);
        self.fetcher.run(options, move |store| {
            transport.send(HttpRequest::get(url)).and_then(move |data| {
                if has_error_field(&data) || envelope::is_error_response(&data) {
                    return Err(FetchError::Backend(data));
                }
                match data.get("fileType").and_then(Value::as_str) {
                    Some("dir") if has_files(&data) => {
                        store.store(&data);
                        Ok(data)
                    },
                    Some("file") if data.get("content").is_some_and(|c| !c.is_null()) => Ok(data),
                    _ => Err(FetchError::Decode(
                        "repository entry without files or content".to_string(),
                    )),
                }
            })
        })
    }

    /// Lists the clusters, or the tables of cluster `parent` when not empty.
    #[instrument(skip(self, call))]
    pub fn fetch_hbase(&self, parent: &str, call: CallOptions) -> CancellableOperation<Arc<Value>> {
        let url = if parent.is_empty() {
            format!("{HBASE_API_PREFIX}getClusters")
        } else {
            format!("{HBASE_API_PREFIX}getTableList/{parent}")
        };
        let options = call.apply(FetchOptions::new(SourceType::Hbase, url.clone()));

        let transport = Arc::clone(&self.transport);
        self.fetcher.run(options, move |store| {
            transport.send(HttpRequest::get(url)).and_then(move |data| {
                if has_error_field(&data) || envelope::is_error_response(&data) {
                    return Err(FetchError::Backend(data));
                }
                store.store(&data);
                Ok(data)
            })
        })
    }

    // ---- SQL metadata ----

    /// Loads the databases of `source_type`, lowercased and without system
    /// databases, and remembers them as the last known list.
    #[instrument(skip(self, call), fields(source = %source_type))]
    pub fn load_databases(&self, source_type: SourceType, call: CallOptions) -> CancellableOperation<Vec<String>> {
        let known = Arc::clone(&self.last_known_databases);
        let on_error = Arc::clone(&self.last_known_databases);
        let failed_source = source_type.clone();

        self.fetch_assist_data(source_type.clone(), AUTOCOMPLETE_API_PREFIX.to_string(), call)
            .map(move |data| {
                let databases: Vec<String> = data
                    .get("databases")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .filter(|name| *name != IMPALA_BUILTINS)
                    .map(str::to_lowercase)
                    .collect();
                debug!(source = %source_type, count = databases.len(), "Databases loaded");
                known.lock().insert(source_type, databases.clone());
                databases
            })
            .on_failure(move |_| {
                on_error.lock().insert(failed_source, Vec::new());
            })
    }

    /// Last known databases, loading them silently when unknown. Never fails;
    /// load errors resolve to an empty list.
    pub fn get_databases(&self, source_type: SourceType) -> CancellableOperation<Vec<String>> {
        if let Some(databases) = self.last_known_databases.lock().get(&source_type) {
            return CancellableOperation::ready(databases.clone());
        }

        let (future, handle) = self.load_databases(source_type, CallOptions::silenced()).into_parts();
        CancellableOperation::from_parts(
            async move { Ok(future.await.unwrap_or_default()) }.boxed(),
            handle,
        )
    }

    /// Case-insensitive database lookup. False on errors and for empty names.
    pub async fn contains_database(&self, source_type: SourceType, database: &str) -> bool {
        if database.is_empty() {
            return false;
        }
        let needle = database.to_lowercase();
        self.get_databases(source_type)
            .await
            .is_ok_and(|databases| databases.contains(&needle))
    }

    #[instrument(skip(self, call), fields(source = %source_type))]
    pub fn fetch_tables(
        &self,
        source_type: SourceType,
        database: &str,
        call: CallOptions,
    ) -> CancellableOperation<Arc<Value>> {
        self.fetch_assist_data(source_type, format!("{AUTOCOMPLETE_API_PREFIX}{database}"), call)
    }

    #[instrument(skip(self, call), fields(source = %source_type))]
    pub fn fetch_fields(
        &self,
        source_type: SourceType,
        database: &str,
        table: &str,
        fields: &[String],
        call: CallOptions,
    ) -> CancellableOperation<Arc<Value>> {
        let mut url = format!("{AUTOCOMPLETE_API_PREFIX}{database}/{table}");
        if !fields.is_empty() {
            url.push('/');
            url.push_str(&fields.join("/"));
        }
        self.fetch_assist_data(source_type, url, call)
    }

    /// Autocomplete POST shared by the metadata wrappers.
    fn fetch_assist_data(&self, source_type: SourceType, url: String, call: CallOptions) -> CancellableOperation<Arc<Value>> {
        let request = HttpRequest::post(url.clone())
            .field("notebook", "{}")
            .field("snippet", json!({ "type": source_type.as_str() }).to_string());
        let options = call
            .apply(FetchOptions::new(source_type, url))
            .cache_condition(generic_cache_condition);

        let transport = Arc::clone(&self.transport);
        self.fetcher.run(options, move |store| {
            transport.send(request).map(move |mut data| {
                let not_found = is_missing_entity(&data);
                if let Some(fields) = data.as_object_mut() {
                    fields.insert("notFound".to_string(), Value::Bool(not_found));
                }
                store.store(&data);
                data
            })
        })
    }

    /// Drops cached data of `source_type` in the cache class of `request`.
    pub fn clear_db_cache(&self, source_type: SourceType, request: &ClearDbCache) -> InvalidationResult {
        let namespace = self.fetcher.namespace(source_type, request.cache_type);
        if request.clear_all {
            let count = self.cache().entry_count(&namespace);
            self.cache().clear(&namespace);
            info!(namespace = %namespace, count, "Database cache cleared");
            return InvalidationResult {
                count,
                patterns: vec!["*".to_string()],
            };
        }

        let key = request.cache_key();
        let count = usize::from(self.cache().invalidate(&namespace, &key));
        debug!(namespace = %namespace, key = %key, count, "Database cache entry cleared");
        InvalidationResult {
            count,
            patterns: vec![key],
        }
    }

    /// Clears every default namespace of the current identity.
    pub fn clear_all(&self) -> InvalidationResult {
        self.cache().clear_all(self.fetcher.identity())
    }

    /// Namespace used by `source_type` and `cache_type` for this client.
    pub fn namespace(&self, source_type: SourceType, cache_type: CacheType) -> Namespace {
        self.fetcher.namespace(source_type, cache_type)
    }

    // ---- Optimizer ----

    #[instrument(skip(self, call), fields(source = %source_type))]
    pub fn fetch_nav_opt_top_tables(
        &self,
        source_type: SourceType,
        database: &str,
        call: CallOptions,
    ) -> CancellableOperation<Arc<Value>> {
        let options = call
            .apply(FetchOptions::new(source_type, TOP_TABLES_API))
            .cache_type(CacheType::Optimizer)
            .hash(database)
            .cache_condition(generic_cache_condition);
        let request = HttpRequest::post(TOP_TABLES_API).field("database", database);

        let transport = Arc::clone(&self.transport);
        self.fetcher.run(options, move |store: CacheStore| {
            transport.send(request).on_success(move |data| {
                store.store(data);
            })
        })
    }

    // ---- Uncached ----

    #[instrument(skip_all)]
    pub fn search_entities(&self, query: SearchQuery, call: CallOptions) -> CancellableOperation<Value> {
        self.send_checked(query.into_request(), call)
    }

    #[instrument(skip(self, call))]
    pub fn simple_get(&self, url: &str, call: CallOptions) -> CancellableOperation<Value> {
        self.send_checked(HttpRequest::get(url), call)
    }

    #[instrument(skip(self, form, call))]
    pub fn simple_post(&self, url: &str, form: Vec<(String, String)>, call: CallOptions) -> CancellableOperation<Value> {
        let mut request = HttpRequest::post(url);
        request.form = form;
        self.send_checked(request, call)
    }

    fn send_checked(&self, request: HttpRequest, call: CallOptions) -> CancellableOperation<Value> {
        let reporter = self.fetcher.reporter().clone();
        let error_options = call.error_options();

        self.transport
            .send(request.timeout(call.timeout))
            .and_then(check_envelope)
            .on_failure(move |error| {
                reporter.report(error, &error_options);
            })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("fetcher", &self.fetcher)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

fn check_envelope(data: Value) -> FetchResult<Value> {
    if envelope::is_error_response(&data) {
        return Err(FetchError::Backend(data));
    }
    Ok(data)
}

fn has_error_field(data: &Value) -> bool {
    match data.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

fn has_files(data: &Value) -> bool {
    data.get("files").is_some_and(|files| !files.is_null())
}

fn file_count(data: &Value) -> usize {
    data.get("files").and_then(Value::as_array).map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Records requests and answers them from a script.
    struct ScriptedTransport {
        requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<VecDeque<FetchResult<Value>>>,
    }

    impl ScriptedTransport {
        fn answering(responses: impl IntoIterator<Item = FetchResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into_iter().collect()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: HttpRequest) -> CancellableOperation<Value> {
            self.requests.lock().push(request);
            match self.responses.lock().pop_front() {
                Some(Ok(value)) => CancellableOperation::ready(value),
                Some(Err(error)) => CancellableOperation::failed(error),
                None => CancellableOperation::failed(FetchError::transport("no scripted response")),
            }
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> ApiClient {
        ApiClient::with_storage(
            transport,
            Arc::new(MemoryStorage::new()),
            CacheConfig::default(),
            Identity::new("alice", "localhost"),
            EventBus::new(),
            500,
        )
    }

    #[test]
    fn test_listing_url() {
        let listing = PathListing::new(["/", "user", "alice"]);
        assert_eq!(
            listing.url(HDFS_API_PREFIX, 500),
            "/filebrowser/view=/user/alice?format=json&sortby=name&descending=false&pagesize=500&pagenum=1"
        );

        let listing = PathListing::new(["", "bucket"]).page(3).page_size(50).filter("a b");
        assert_eq!(
            listing.url(S3_API_PREFIX, 500),
            "/filebrowser/view=S3A://bucket?format=json&sortby=name&descending=false&pagesize=50&pagenum=3&filter=a%20b"
        );

        assert_eq!(PathListing::from_path("/user/alice/").path_parts, vec!["user", "alice"]);
    }

    #[test]
    fn test_clear_db_cache_key() {
        assert_eq!(ClearDbCache::default().cache_key(), "/notebook/api/autocomplete/");
        assert_eq!(
            ClearDbCache::database("sales").table("orders").fields(["items", "price"]).cache_key(),
            "/notebook/api/autocomplete/sales/orders/items/price"
        );
    }

    #[test]
    fn test_search_request_defaults() {
        let request = SearchQuery::new("orders").into_request();
        assert_eq!(request.url, SEARCH_API);
        assert_eq!(request.form_value("query_s"), Some("\"orders\""));
        assert_eq!(request.form_value("limit"), Some("100"));
        assert_eq!(request.form_value("raw_query"), Some("false"));
        assert_eq!(request.form_value("sources"), Some(r#"["sql"]"#));
    }

    #[test]
    fn test_error_field() {
        assert!(!has_error_field(&json!({ "files": [] })));
        assert!(!has_error_field(&json!({ "error": "" })));
        assert!(!has_error_field(&json!({ "error": null })));
        assert!(has_error_field(&json!({ "error": "Permission denied" })));
        assert!(has_error_field(&json!({ "error": true })));
    }

    #[tokio::test]
    async fn test_listing_is_cached_when_large() {
        let transport = ScriptedTransport::answering([Ok(json!({ "files": [".", "..", "a"] }))]);
        let client = client(transport.clone());

        for _ in 0..2 {
            let listing = client
                .fetch_hdfs_path(PathListing::from_path("/tmp"), CallOptions::default())
                .await
                .unwrap();
            assert_eq!(file_count(&listing), 3);
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_listing_is_not_cached() {
        let transport = ScriptedTransport::answering([
            Ok(json!({ "files": [".", "..", "a"] })),
            Ok(json!({ "files": [".", "..", "a"] })),
        ]);
        let client = client(transport.clone());

        for _ in 0..2 {
            client
                .fetch_adls_path(PathListing::from_path("/data").filter("a"), CallOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_listing_without_files_is_an_error() {
        let transport = ScriptedTransport::answering([Ok(json!({ "error": "Cannot access" }))]);
        let client = client(transport);

        let result = client
            .fetch_hdfs_path(PathListing::from_path("/secret"), CallOptions::silenced())
            .await;
        assert!(matches!(result, Err(FetchError::Backend(_))));
    }

    #[tokio::test]
    async fn test_git_file_contents() {
        let transport = ScriptedTransport::answering([Ok(json!({ "fileType": "file", "content": "SELECT 1" }))]);
        let client = client(transport.clone());

        let data = client
            .fetch_git_contents(&["queries".to_string(), "q.sql".to_string()], GitFileType::File, CallOptions::default())
            .await
            .unwrap();

        assert_eq!(data["content"], "SELECT 1");
        assert_eq!(transport.requests()[0].url, "/desktop/api/vcs/contents/?path=queries/q.sql&fileType=file");
        let ns = client.namespace(SourceType::Git, CacheType::Default);
        assert_eq!(client.cache().entry_count(&ns), 0);
    }

    #[tokio::test]
    async fn test_hbase_urls() {
        let transport = ScriptedTransport::answering([Ok(json!({ "data": [] })), Ok(json!({ "data": [] }))]);
        let client = client(transport.clone());

        client.fetch_hbase("", CallOptions::default()).await.unwrap();
        client.fetch_hbase("cluster1", CallOptions::default()).await.unwrap();

        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["/hbase/api/getClusters", "/hbase/api/getTableList/cluster1"]);
    }

    #[tokio::test]
    async fn test_load_databases_cleans_names() {
        let transport = ScriptedTransport::answering([Ok(json!({
            "status": 0,
            "databases": ["Default", "_impala_builtins", "SALES"]
        }))]);
        let client = client(transport.clone());

        let databases = client
            .load_databases(SourceType::engine("impala"), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(databases, vec!["default", "sales"]);

        let request = &transport.requests()[0];
        assert_eq!(request.url, AUTOCOMPLETE_API_PREFIX);
        assert_eq!(request.form_value("notebook"), Some("{}"));
        assert_eq!(request.form_value("snippet"), Some(r#"{"type":"impala"}"#));

        // Served from the last known list
        assert!(client.contains_database(SourceType::engine("impala"), "Sales").await);
        assert!(!client.contains_database(SourceType::engine("impala"), "").await);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_get_databases_resolves_empty_on_error() {
        let transport = ScriptedTransport::answering([Err(FetchError::http(500, "Internal Server Error", ""))]);
        let client = client(transport);

        let databases = client.get_databases(SourceType::engine("hive")).await.unwrap();
        assert!(databases.is_empty());
        assert!(!client.contains_database(SourceType::engine("hive"), "default").await);
    }

    #[tokio::test]
    async fn test_missing_table_is_flagged_and_cached() {
        let transport = ScriptedTransport::answering([Ok(json!({
            "status": 0,
            "code": 500,
            "error": "SemanticException [Error 10001]: Table not found default.foo"
        }))]);
        let client = client(transport.clone());

        for _ in 0..2 {
            let data = client
                .fetch_fields(SourceType::engine("hive"), "default", "foo", &[], CallOptions::default())
                .await
                .unwrap();
            assert_eq!(data["notFound"], true);
        }
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(transport.requests()[0].url, "/notebook/api/autocomplete/default/foo");
    }

    #[tokio::test]
    async fn test_clear_db_cache() {
        let transport = ScriptedTransport::answering([
            Ok(json!({ "status": 0, "tables_meta": [] })),
            Ok(json!({ "status": 0, "tables_meta": [] })),
        ]);
        let client = client(transport);
        let hive = SourceType::engine("hive");
        let ns = client.namespace(hive.clone(), CacheType::Default);

        client.fetch_tables(hive.clone(), "sales", CallOptions::default()).await.unwrap();
        client.fetch_tables(hive.clone(), "hr", CallOptions::default()).await.unwrap();
        assert_eq!(client.cache().entry_count(&ns), 2);

        let result = client.clear_db_cache(hive.clone(), &ClearDbCache::database("sales"));
        assert_eq!(result.count, 1);
        assert_eq!(client.cache().keys(&ns), vec!["/notebook/api/autocomplete/hr".to_string()]);

        let result = client.clear_db_cache(hive, &ClearDbCache::all());
        assert_eq!(result.count, 1);
        assert_eq!(client.cache().entry_count(&ns), 0);
    }

    #[tokio::test]
    async fn test_top_tables_use_optimizer_cache() {
        let transport = ScriptedTransport::answering([Ok(json!({ "status": 0, "top_tables": [] }))]);
        let client = client(transport.clone());
        let impala = SourceType::engine("impala");

        client
            .fetch_nav_opt_top_tables(impala.clone(), "sales", CallOptions::default())
            .await
            .unwrap();

        let optimizer = client.namespace(impala.clone(), CacheType::Optimizer);
        assert_eq!(client.cache().keys(&optimizer), vec![format!("{TOP_TABLES_API}sales")]);
        assert_eq!(client.cache().entry_count(&client.namespace(impala, CacheType::Default)), 0);
        assert_eq!(transport.requests()[0].form_value("database"), Some("sales"));
    }

    #[tokio::test]
    async fn test_clear_db_cache_optimizer_key() {
        let transport = ScriptedTransport::answering([
            Ok(json!({ "status": 0, "top_tables": [] })),
            Ok(json!({ "status": 0, "top_tables": [] })),
            Ok(json!({ "status": 0, "tables_meta": [] })),
            Ok(json!({ "status": 0, "top_tables": [] })),
        ]);
        let client = client(transport.clone());
        let impala = SourceType::engine("impala");
        let optimizer = client.namespace(impala.clone(), CacheType::Optimizer);
        let metadata = client.namespace(impala.clone(), CacheType::Default);

        for database in ["sales", "hr"] {
            client
                .fetch_nav_opt_top_tables(impala.clone(), database, CallOptions::default())
                .await
                .unwrap();
        }
        client.fetch_tables(impala.clone(), "sales", CallOptions::default()).await.unwrap();

        // A default-class request leaves optimizer entries alone
        let request = ClearDbCache::default().key(format!("{TOP_TABLES_API}sales"));
        let result = client.clear_db_cache(impala.clone(), &request);
        assert_eq!(result.count, 0);
        assert_eq!(client.cache().entry_count(&optimizer), 2);

        let request = ClearDbCache::default()
            .cache_type(CacheType::Optimizer)
            .key(format!("{TOP_TABLES_API}sales"));
        let result = client.clear_db_cache(impala.clone(), &request);
        assert_eq!(result.count, 1);
        assert_eq!(client.cache().keys(&optimizer), vec![format!("{TOP_TABLES_API}hr")]);
        assert_eq!(client.cache().entry_count(&metadata), 1);

        // Refetched once its entry is gone
        client
            .fetch_nav_opt_top_tables(impala.clone(), "sales", CallOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.requests().len(), 4);

        let result = client.clear_db_cache(impala, &ClearDbCache::all().cache_type(CacheType::Optimizer));
        assert_eq!(result.count, 2);
        assert_eq!(client.cache().entry_count(&optimizer), 0);
        assert_eq!(client.cache().entry_count(&metadata), 1);
    }

    #[tokio::test]
    async fn test_simple_get_normalizes_error_envelopes() {
        let transport = ScriptedTransport::answering([Ok(json!({ "status": 1, "message": "Query expired" }))]);
        let client = client(transport);
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();

        let result = client
            .simple_get(
                "/notebook/api/check_status",
                CallOptions::default().error_callback(move |m| sink.lock().push(m.to_string())),
            )
            .await;

        assert!(matches!(result, Err(FetchError::Backend(_))));
        assert_eq!(*messages.lock(), vec!["Query expired".to_string()]);
    }
}
