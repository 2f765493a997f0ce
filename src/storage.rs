use std::{
    collections::HashMap,
    fmt, fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
    sync::{Arc, RwLock},
};

use thiserror::Error;

/// 儲存操作可能發生的錯誤類型。
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Key is invalid: {0}")]
    InvalidKey(String),
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Key is a dir: {0}")]
    IsDir(String),
    #[error("Not a directory: {0}")]
    NotDirectory(String),
    #[error("Lock poisoned")]
    LockPoisoned,
}

/// 儲存操作的結果類型，封裝 [`StorageError`]。
pub type Result<T> = std::result::Result<T, StorageError>;

/// 以 `/` 分隔的 key 存取檔案與目錄的儲存介面。
///
/// 金鑰、CSR、憑證與挑戰檔都透過此介面寫入，核心流程不直接碰觸檔案系統。
pub trait Storage: Send + Sync + fmt::Debug {
    /// 建立指定 key 所對應的目錄樹，若不存在則自動建立。
    fn create_dir_all(&self, key: &str) -> Result<()>;

    /// 讀取指定 key 所對應檔案的內容。
    fn read_file(&self, key: &str) -> Result<Vec<u8>>;

    /// 將資料寫入指定 key 所對應的檔案中，父目錄不存在時自動建立。
    fn write_file(&self, key: &str, value: &[u8]) -> Result<()>;

    /// 刪除指定 key 所對應的檔案或目錄；key 不存在時視為成功。
    fn remove(&self, key: &str) -> Result<()>;

    /// 檢查指定 key 是否存在於儲存系統中。
    fn exists(&self, key: &str) -> Result<bool>;

    /// 判斷指定 key 是否為目錄。
    fn is_dir(&self, key: &str) -> Result<bool>;

    /// 預設方法：確保給定路徑的父目錄存在且為目錄，否則嘗試建立。
    fn ensure_parent_directory(&self, path: &Path) -> Result<()> {
        if let Some(parent) = KeyUtils::parent(path) {
            let parent_key = parent.to_string_lossy();
            if !self.exists(&parent_key)? {
                self.create_dir_all(&parent_key)?;
            } else if !self.is_dir(&parent_key)? {
                return Err(StorageError::NotDirectory(parent_key.into_owned()));
            }
        }
        Ok(())
    }
}

/// key 正規化與驗證。
struct KeyUtils;

impl KeyUtils {
    /// 正規化 key 字串為以 `/` 開頭的路徑，並拒絕跳出根目錄的 key。
    fn normalize(key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Empty key".to_string()));
        }
        if key.contains('\0') || key.contains('\n') || key.contains('\r') {
            return Err(StorageError::InvalidKey(format!(
                "Invalid characters in key: {}",
                key
            )));
        }
        if key.contains("//") {
            return Err(StorageError::InvalidKey(format!(
                "Double slashes not allowed in key: {}",
                key
            )));
        }
        let mut normalized = PathBuf::from("/");
        for component in Path::new(key).components() {
            match component {
                Component::RootDir => normalized = PathBuf::from("/"),
                Component::CurDir => {}
                Component::ParentDir => {
                    if normalized.as_os_str() == "/" {
                        return Err(StorageError::InvalidKey(format!(
                            "Cannot use '..' to escape root directory: {}",
                            key
                        )));
                    }
                    normalized.pop();
                }
                Component::Normal(name) => match name.to_str() {
                    Some(name) if !name.contains('\\') => normalized.push(name),
                    _ => {
                        return Err(StorageError::InvalidKey(format!(
                            "Invalid path component in: {}",
                            key
                        )))
                    }
                },
                _ => return Err(StorageError::InvalidKey(format!("Invalid path: {}", key))),
            }
        }
        Ok(normalized)
    }

    fn parent(path: &Path) -> Option<PathBuf> {
        path.parent().map(Path::to_path_buf)
    }

    fn verify_file_key(key: &str) -> Result<PathBuf> {
        let path = Self::normalize(key)?;
        if key.ends_with('/') || path.as_os_str() == "/" {
            return Err(StorageError::InvalidKey(format!(
                "File key cannot end with '/': {}",
                key
            )));
        }
        Ok(path)
    }
}

/// 將 key 對應到某個根目錄下真實檔案的儲存實作。
///
/// 新建立的目錄與檔案會套用設定的權限（僅 Unix 有效）：
/// 預設目錄 `0700`、檔案 `0600`，適合存放私鑰；
/// 網站根目錄應改用 `0755` / `0644` 讓 HTTP 伺服器讀得到挑戰檔。
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
    dir_mode: u32,
    file_mode: u32,
}

impl DirStorage {
    const DEFAULT_DIR_MODE: u32 = 0o700;
    const DEFAULT_FILE_MODE: u32 = 0o600;

    /// 以 `root` 為根目錄開啟儲存，使用預設權限；根目錄不存在時會建立。
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with_modes(root, Self::DEFAULT_DIR_MODE, Self::DEFAULT_FILE_MODE)
    }

    /// 同 [`DirStorage::open`]，但指定新目錄與新檔案的權限。
    pub fn open_with_modes<P: AsRef<Path>>(root: P, dir_mode: u32, file_mode: u32) -> Result<Self> {
        let storage = Self {
            root: root.as_ref().to_path_buf(),
            dir_mode,
            file_mode,
        };
        storage.make_dirs(&storage.root)?;
        Ok(storage)
    }

    /// 將 key 轉為根目錄下的實際路徑。
    pub fn path_of(&self, key: &str) -> Result<PathBuf> {
        let normalized = KeyUtils::normalize(key)?;
        Ok(self.join(&normalized))
    }

    fn join(&self, normalized: &Path) -> PathBuf {
        match normalized.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(normalized),
        }
    }

    fn make_dirs(&self, path: &Path) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.dir_mode);
        }
        builder.create(path)?;
        Ok(())
    }
}

impl Storage for DirStorage {
    fn create_dir_all(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        if path.is_file() {
            return Err(StorageError::NotDirectory(key.to_string()));
        }
        self.make_dirs(&path)
    }

    fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.join(&KeyUtils::verify_file_key(key)?);
        if path.is_dir() {
            return Err(StorageError::IsDir(key.to_string()));
        }
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io(e),
        })
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<()> {
        let normalized = KeyUtils::verify_file_key(key)?;
        self.ensure_parent_directory(&normalized)?;

        let path = self.join(&normalized);
        if path.is_dir() {
            return Err(StorageError::IsDir(key.to_string()));
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.file_mode);
        }
        let mut file = options.open(&path)?;
        file.write_all(value)?;
        file.sync_all()?;

        // 既有檔案不會套用 open 時的 mode，需另外設定
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(self.file_mode))?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_of(key)?.exists())
    }

    fn is_dir(&self, key: &str) -> Result<bool> {
        Ok(self.path_of(key)?.is_dir())
    }
}

/// 基於記憶體的儲存實作，資料與目錄結構皆保存在記憶體中。
#[derive(Debug)]
pub struct MemStorage {
    data: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<RwLock<HashMap<PathBuf, ()>>>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    /// 建立一個新的記憶體儲存實例，並初始化根目錄 `/`。
    pub fn new() -> Self {
        let mut dirs = HashMap::new();
        dirs.insert(PathBuf::from("/"), ());
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            dirs: Arc::new(RwLock::new(dirs)),
        }
    }
}

impl Storage for MemStorage {
    fn create_dir_all(&self, key: &str) -> Result<()> {
        let path = KeyUtils::normalize(key)?;
        let mut current = PathBuf::from("/");
        let mut dirs = self.dirs.write().map_err(|_| StorageError::LockPoisoned)?;
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        // 逐層建立目錄，若同名檔案已存在則回傳錯誤
        for component in path.components().skip(1) {
            current.push(component);
            if data.contains_key(&current) {
                return Err(StorageError::NotDirectory(
                    current.to_string_lossy().into_owned(),
                ));
            }
            dirs.entry(current.clone()).or_insert(());
        }
        Ok(())
    }

    fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = KeyUtils::verify_file_key(key)?;
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        data.get(&path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = KeyUtils::verify_file_key(key)?;
        self.ensure_parent_directory(&path)?;
        self.data
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(path, value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = KeyUtils::normalize(key)?;
        self.data
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .retain(|p, _| !p.starts_with(&path));
        self.dirs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .retain(|p, _| p.as_os_str() == "/" || !p.starts_with(&path));
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = KeyUtils::normalize(key)?;
        Ok(self
            .data
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains_key(&path)
            || self
                .dirs
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .contains_key(&path))
    }

    fn is_dir(&self, key: &str) -> Result<bool> {
        let path = KeyUtils::normalize(key)?;
        Ok(self
            .dirs
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains_key(&path))
    }
}
