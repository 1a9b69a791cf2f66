//! Durable queue store backed by an append-only JSONL journal.

use crate::error::{LumoError, Result};
use crate::types::QueueItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const JOURNAL_FILE: &str = "journal.jsonl";
const COMPACT_MIN_DEAD: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Put { item: QueueItem },
    Remove { ids: Vec<String> },
}

struct StoreInner {
    writer: BufWriter<File>,
    items: HashMap<String, (u64, QueueItem)>,
    next_seq: u64,
    /// Journal lines that no longer describe a live item
    dead_records: usize,
}

pub struct QueueStore {
    dir: PathBuf,
    inner: Mutex<StoreInner>,
}

impl QueueStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);

        let mut items = HashMap::new();
        let mut next_seq = 0u64;
        let mut dead_records = 0usize;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalRecord>(&line) {
                    Ok(JournalRecord::Put { item }) => {
                        next_seq += 1;
                        if items.insert(item.id.clone(), (next_seq, item)).is_some() {
                            dead_records += 1;
                        }
                    }
                    Ok(JournalRecord::Remove { ids }) => {
                        dead_records += 1;
                        for id in ids {
                            if items.remove(&id).is_some() {
                                dead_records += 1;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[STORE] skipping unreadable journal line {}: {}",
                            line_no + 1,
                            e
                        );
                        dead_records += 1;
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::info!(
            "[STORE] opened {} ({} pending)",
            path.display(),
            items.len()
        );

        Ok(QueueStore {
            dir: dir.to_path_buf(),
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                items,
                next_seq,
                dead_records,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| LumoError::Storage("queue store lock poisoned".into()))
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    pub fn put(&self, item: QueueItem) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.items.contains_key(&item.id) {
            return Err(LumoError::Storage(format!(
                "item {} already queued",
                item.id
            )));
        }

        let record = JournalRecord::Put { item };
        write_record(&mut inner.writer, &record)?;

        if let JournalRecord::Put { item } = record {
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.items.insert(item.id.clone(), (seq, item));
        }
        Ok(())
    }

    /// All stored items, oldest first.
    pub fn list(&self) -> Result<Vec<QueueItem>> {
        let inner = self.lock()?;
        let mut entries: Vec<&(u64, QueueItem)> = inner.items.values().collect();
        entries.sort_by(|a, b| {
            a.1.created_at
                .cmp(&b.1.created_at)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(entries.into_iter().map(|(_, item)| item.clone()).collect())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.items.contains_key(id))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove the given ids; unknown ids are ignored. Returns how many were removed.
    pub fn remove(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut inner = self.lock()?;
        let present: Vec<String> = ids
            .iter()
            .filter(|id| inner.items.contains_key(id.as_str()))
            .cloned()
            .collect();
        if present.is_empty() {
            return Ok(0);
        }

        write_record(
            &mut inner.writer,
            &JournalRecord::Remove {
                ids: present.clone(),
            },
        )?;
        for id in &present {
            inner.items.remove(id);
        }
        // one dead line per removed put, plus the remove record itself
        inner.dead_records += present.len() + 1;

        // the remove is already durable; a failed rewrite is retried on the next remove
        if inner.dead_records >= COMPACT_MIN_DEAD && inner.dead_records > inner.items.len() {
            if let Err(e) = self.compact_locked(&mut inner) {
                tracing::warn!("[STORE] compaction failed, keeping journal as is: {}", e);
            }
        }

        Ok(present.len())
    }

    /// Rewrite the journal so it only holds live items.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.lock()?;
        self.compact_locked(&mut inner)
    }

    fn compact_locked(&self, inner: &mut StoreInner) -> Result<()> {
        inner.writer.flush()?;

        let mut live: Vec<&(u64, QueueItem)> = inner.items.values().collect();
        live.sort_by_key(|(seq, _)| *seq);

        let tmp_path = self.dir.join(format!("{}.tmp", JOURNAL_FILE));
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for (_, item) in &live {
                let line = serde_json::to_string(&JournalRecord::Put {
                    item: (*item).clone(),
                })?;
                tmp.write_all(line.as_bytes())?;
                tmp.write_all(b"\n")?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        // opened before the rename so nothing can fail once the journal is swapped
        let file = OpenOptions::new().append(true).open(&tmp_path)?;
        fs::rename(&tmp_path, self.journal_path())?;
        inner.writer = BufWriter::new(file);

        tracing::debug!(
            "[STORE] compacted journal, dropped {} dead records",
            inner.dead_records
        );
        inner.dead_records = 0;
        Ok(())
    }
}

fn write_record(writer: &mut BufWriter<File>, record: &JournalRecord) -> Result<()> {
    let line = serde_json::to_string(record)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn item(id: &str) -> QueueItem {
        QueueItem {
            id: id.to_string(),
            kind: ActionKind::MarkRoutineItem,
            payload: json!({"itemId": id}),
            created_at: Utc::now(),
        }
    }

    fn ids(items: &[QueueItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_put_and_list() {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();

        assert!(store.is_empty().unwrap());
        store.put(item("a")).unwrap();
        store.put(item("b")).unwrap();

        let all = store.list().unwrap();
        assert_eq!(ids(&all), vec!["a", "b"]);
        assert!(store.contains("a").unwrap());
    }

    #[test]
    fn test_list_orders_by_created_at() {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();

        let now = Utc::now();
        let mut late = item("late");
        late.created_at = now + Duration::seconds(5);
        let mut early = item("early");
        early.created_at = now;

        store.put(late).unwrap();
        store.put(early).unwrap();

        assert_eq!(ids(&store.list().unwrap()), vec!["early", "late"]);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();

        let ts = Utc::now();
        for id in ["x", "y", "z"] {
            let mut it = item(id);
            it.created_at = ts;
            store.put(it).unwrap();
        }

        assert_eq!(ids(&store.list().unwrap()), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();

        store.put(item("a")).unwrap();
        let err = store.put(item("a")).unwrap_err();
        assert!(matches!(err, LumoError::Storage(_)));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_remove_ignores_unknown_and_empty() {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();
        store.put(item("a")).unwrap();
        store.put(item("b")).unwrap();

        assert_eq!(store.remove(&[]).unwrap(), 0);
        assert_eq!(
            store
                .remove(&["a".to_string(), "ghost".to_string()])
                .unwrap(),
            1
        );
        assert_eq!(ids(&store.list().unwrap()), vec!["b"]);
    }

    #[test]
    fn test_reopen_replays_journal() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();

        {
            let store = QueueStore::open(&dir).unwrap();
            store.put(item("a")).unwrap();
            store.put(item("b")).unwrap();
            store.put(item("c")).unwrap();
            store.remove(&["b".to_string()]).unwrap();
        }

        let store = QueueStore::open(&dir).unwrap();
        assert_eq!(ids(&store.list().unwrap()), vec!["a", "c"]);

        store.put(item("d")).unwrap();
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn test_reopen_skips_corrupt_lines() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();

        {
            let store = QueueStore::open(&dir).unwrap();
            store.put(item("a")).unwrap();
        }
        let mut f = OpenOptions::new()
            .append(true)
            .open(dir.join(JOURNAL_FILE))
            .unwrap();
        f.write_all(b"{\"op\":\"put\",\"item\":{\"trunc\n").unwrap();
        drop(f);

        let store = QueueStore::open(&dir).unwrap();
        assert_eq!(ids(&store.list().unwrap()), vec!["a"]);
    }

    #[test]
    fn test_compact_keeps_live_items() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();

        {
            let store = QueueStore::open(&dir).unwrap();
            for i in 0..10 {
                store.put(item(&format!("i{}", i))).unwrap();
            }
            let gone: Vec<String> = (0..8).map(|i| format!("i{}", i)).collect();
            store.remove(&gone).unwrap();
            store.compact().unwrap();

            let journal = fs::read_to_string(dir.join(JOURNAL_FILE)).unwrap();
            assert_eq!(journal.lines().count(), 2);
        }

        let store = QueueStore::open(&dir).unwrap();
        assert_eq!(ids(&store.list().unwrap()), vec!["i8", "i9"]);
    }

    #[test]
    fn test_auto_compaction_bounds_journal() {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(tmp.path()).unwrap();

        for i in 0..100 {
            let id = format!("n{}", i);
            store.put(item(&id)).unwrap();
            store.remove(&[id]).unwrap();
        }

        let journal = fs::read_to_string(tmp.path().join(JOURNAL_FILE)).unwrap();
        assert!(journal.lines().count() < 2 * COMPACT_MIN_DEAD);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_failed_auto_compaction_keeps_remove_committed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        // a directory where the rewrite wants its temp file
        fs::create_dir(dir.join(format!("{}.tmp", JOURNAL_FILE))).unwrap();

        {
            let store = QueueStore::open(&dir).unwrap();
            for i in 0..100 {
                let id = format!("n{}", i);
                store.put(item(&id)).unwrap();
                assert_eq!(store.remove(&[id]).unwrap(), 1);
            }
            store.put(item("kept")).unwrap();
            assert_eq!(ids(&store.list().unwrap()), vec!["kept"]);
            assert!(store.compact().is_err());
        }

        let store = QueueStore::open(&dir).unwrap();
        assert_eq!(ids(&store.list().unwrap()), vec!["kept"]);
    }
}
