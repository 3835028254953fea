//! Vocabulary, label table and subword hashing

use super::reader::{ModelReader, checked_len, invalid_data, out_of_memory};
use crate::backend::LABEL_PREFIX;
use std::collections::HashMap;
use std::io::{self, Read};

/// End-of-sentence token appended to every line
pub(crate) const EOS: &[u8] = b"</s>";

const BOW: u8 = b'<';
const EOW: u8 = b'>';

/// Multiplier used to combine consecutive word hashes into n-gram hashes
const NGRAM_HASH_MULTIPLIER: u64 = 116_049_371;

/// Bytes that separate tokens
fn is_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\r' | b'\t' | 0x0b | 0x0c | 0)
}

/// fastText's FNV-1a variant; bytes are sign-extended before xor
pub(crate) fn hash(bytes: &[u8]) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for &b in bytes {
        h ^= (b as i8) as u32;
        h = h.wrapping_mul(16_777_619);
    }
    h
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Word,
    Label,
}

#[derive(Debug)]
struct Entry {
    word: Box<[u8]>,
    kind: EntryKind,
}

/// Subword parameters taken from the model header
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubwordParams {
    pub(crate) minn: usize,
    pub(crate) maxn: usize,
    pub(crate) bucket: usize,
    pub(crate) word_ngrams: usize,
}

#[derive(Debug)]
pub(crate) struct Dictionary {
    entries: Vec<Entry>,
    word2id: HashMap<Box<[u8]>, usize>,
    nwords: usize,
    nlabels: usize,
    label_counts: Vec<i64>,
    /// Maps bucket ids to compacted rows when the input matrix was pruned
    prune: Option<HashMap<i32, i32>>,
    params: SubwordParams,
}

impl Dictionary {
    pub(crate) fn read<R: Read>(reader: &mut ModelReader<R>, params: SubwordParams) -> io::Result<Self> {
        let size = checked_len(reader.read_i32()?.into(), "dictionary size")?;
        let nwords = checked_len(reader.read_i32()?.into(), "word count")?;
        let nlabels = checked_len(reader.read_i32()?.into(), "label count")?;
        let _ntokens = reader.read_i64()?;
        let pruneidx_size = reader.read_i64()?;

        if nwords.checked_add(nlabels) != Some(size) {
            return Err(invalid_data(format!(
                "dictionary size {} does not equal {} words + {} labels",
                size, nwords, nlabels
            )));
        }
        if nlabels == 0 {
            return Err(invalid_data("model has no labels"));
        }

        let mut entries = Vec::new();
        entries.try_reserve_exact(size).map_err(out_of_memory)?;
        let mut word2id = HashMap::new();
        word2id.try_reserve(size).map_err(out_of_memory)?;
        let mut label_counts = Vec::with_capacity(nlabels);

        for id in 0..size {
            let word = reader.read_cstring()?;
            let count = reader.read_i64()?;
            let kind = match reader.read_i8()? {
                0 => EntryKind::Word,
                1 => EntryKind::Label,
                other => return Err(invalid_data(format!("unknown entry type {}", other))),
            };
            if (kind == EntryKind::Label) != (id >= nwords) {
                return Err(invalid_data(format!("entry {} is out of word/label order", id)));
            }
            if kind == EntryKind::Label {
                label_counts.push(count);
            }
            word2id.insert(word.clone(), id);
            entries.push(Entry { word, kind });
        }

        let prune = if pruneidx_size >= 0 {
            let n = checked_len(pruneidx_size, "prune index size")?;
            let mut map = HashMap::new();
            map.try_reserve(n).map_err(out_of_memory)?;
            for _ in 0..n {
                let from = reader.read_i32()?;
                let to = reader.read_i32()?;
                if to < 0 {
                    return Err(invalid_data(format!("negative pruned row {}", to)));
                }
                map.insert(from, to);
            }
            Some(map)
        } else {
            None
        };

        Ok(Self {
            entries,
            word2id,
            nwords,
            nlabels,
            label_counts,
            prune,
            params,
        })
    }

    pub(crate) fn nwords(&self) -> usize {
        self.nwords
    }

    pub(crate) fn nlabels(&self) -> usize {
        self.nlabels
    }

    pub(crate) fn is_pruned(&self) -> bool {
        self.prune.is_some()
    }

    /// Input-matrix rows that [`Dictionary::line_ids`] may address
    pub(crate) fn input_rows_needed(&self) -> usize {
        let subword_rows = match &self.prune {
            Some(map) => map.values().map(|&to| to as usize + 1).max().unwrap_or(0),
            None => self.params.bucket,
        };
        self.nwords + subword_rows
    }

    /// Training counts for each label, in label order
    pub(crate) fn label_counts(&self) -> &[i64] {
        &self.label_counts
    }

    /// Label text for output row `id`
    pub(crate) fn label(&self, id: usize) -> &[u8] {
        &self.entries[self.nwords + id].word
    }

    /// Input-matrix rows for one line of text
    pub(crate) fn line_ids(&self, line: &[u8]) -> Vec<usize> {
        let mut ids = Vec::new();
        let mut word_hashes: Vec<i32> = Vec::new();

        let tokens = line
            .split(|&b| is_separator(b))
            .filter(|t| !t.is_empty())
            .chain(std::iter::once(EOS));

        for token in tokens {
            let h = hash(token);
            match self.word2id.get(token) {
                Some(&wid) => match self.entries[wid].kind {
                    EntryKind::Word => {
                        ids.push(wid);
                        if token != EOS {
                            self.push_char_ngrams(token, &mut ids);
                        }
                        word_hashes.push(h as i32);
                    }
                    EntryKind::Label => {}
                },
                None if token.starts_with(LABEL_PREFIX.as_bytes()) => {}
                None => {
                    if token != EOS {
                        self.push_char_ngrams(token, &mut ids);
                    }
                    word_hashes.push(h as i32);
                }
            }
        }

        self.push_word_ngrams(&word_hashes, &mut ids);
        ids
    }

    fn push_hash(&self, ids: &mut Vec<usize>, id: i32) {
        if id < 0 {
            return;
        }
        let id = match &self.prune {
            Some(map) => match map.get(&id) {
                Some(&mapped) => mapped,
                None => return,
            },
            None => id,
        };
        ids.push(self.nwords + id as usize);
    }

    /// Hash character n-grams of `<token>` into buckets
    fn push_char_ngrams(&self, token: &[u8], ids: &mut Vec<usize>) {
        let SubwordParams {
            minn, maxn, bucket, ..
        } = self.params;
        if maxn == 0 || bucket == 0 {
            return;
        }

        let mut word = Vec::with_capacity(token.len() + 2);
        word.push(BOW);
        word.extend_from_slice(token);
        word.push(EOW);

        let is_continuation = |b: u8| b & 0xC0 == 0x80;
        let mut ngram = Vec::new();
        for i in 0..word.len() {
            if is_continuation(word[i]) {
                continue;
            }
            ngram.clear();
            let mut j = i;
            let mut n = 1;
            while j < word.len() && n <= maxn {
                ngram.push(word[j]);
                j += 1;
                while j < word.len() && is_continuation(word[j]) {
                    ngram.push(word[j]);
                    j += 1;
                }
                if n >= minn && !(n == 1 && (i == 0 || j == word.len())) {
                    let id = (hash(&ngram) as usize % bucket) as i32;
                    self.push_hash(ids, id);
                }
                n += 1;
            }
        }
    }

    fn push_word_ngrams(&self, hashes: &[i32], ids: &mut Vec<usize>) {
        let SubwordParams {
            bucket, word_ngrams, ..
        } = self.params;
        if bucket == 0 {
            return;
        }
        for i in 0..hashes.len() {
            let mut h = hashes[i] as u64;
            for &next in hashes.iter().skip(i + 1).take(word_ngrams.saturating_sub(1)) {
                h = h.wrapping_mul(NGRAM_HASH_MULTIPLIER).wrapping_add(next as u64);
                let id = (h % bucket as u64) as i32;
                self.push_hash(ids, id);
            }
        }
    }
}
