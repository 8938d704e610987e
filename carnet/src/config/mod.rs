/// Where uploaded photos live. The db store keeps blobs in the `photos` table,
/// the fs store writes one file per photo under the given directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhotoStorage {
    Db,
    Fs(String),
}

impl PhotoStorage {
    pub fn new(storage_type: &str, path: String) -> Self {
        if storage_type == "db" {
            PhotoStorage::Db
        } else {
            PhotoStorage::Fs(path)
        }
    }
}

/// Save configuration information related to the carnet daemon
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// listen address of the admin json-rpc api
    pub url: String,
    /// listen address of the public verification pages
    pub verify_url: String,
    /// base of every url handed out, QR codes point below it
    pub public_base_url: String,
    pub db_dsn: String,
    pub photo_storage: PhotoStorage,

    pub log_level: String,
    pub debug_sql: bool,
}

impl ServiceConfig {
    pub fn new(
        url: String,
        verify_url: String,
        public_base_url: String,
        db_dsn: String,
        photo_storage_type: String,
        photo_path: String,
        log_level: String,
        debug_sql: bool,
    ) -> Self {
        let public_base_url = if public_base_url.is_empty() {
            format!("http://{}", verify_url)
        } else {
            public_base_url.trim_end_matches('/').to_owned()
        };

        Self {
            url,
            verify_url,
            public_base_url,
            db_dsn,
            photo_storage: PhotoStorage::new(&photo_storage_type, photo_path),
            log_level,
            debug_sql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(public_base_url: &str, storage: &str) -> ServiceConfig {
        ServiceConfig::new(
            "127.0.0.1:18890".to_owned(),
            "0.0.0.0:18891".to_owned(),
            public_base_url.to_owned(),
            "sqlite://carnet.db".to_owned(),
            storage.to_owned(),
            "photos".to_owned(),
            "info".to_owned(),
            false,
        )
    }

    #[test]
    fn public_base_url_defaults_to_verify_listener() {
        assert_eq!(cfg("", "fs").public_base_url, "http://0.0.0.0:18891");
        assert_eq!(
            cfg("https://carnet.example.org/", "fs").public_base_url,
            "https://carnet.example.org"
        );
    }

    #[test]
    fn photo_storage_selection() {
        assert_eq!(cfg("", "db").photo_storage, PhotoStorage::Db);
        assert_eq!(
            cfg("", "fs").photo_storage,
            PhotoStorage::Fs("photos".to_owned())
        );
    }
}
