//! Request batching for phase 3 (artifact registration) and phase 4
//! (job I/O linking), grounded on
//! `original_source/roar/services/registration/artifact.py`'s
//! `_batch_by_size` and
//! `original_source/roar/services/registration/job.py`'s
//! `_batch_artifacts`.

use serde_json::Value;

/// Greedily pack `items` into batches whose serialized JSON array stays
/// under `max_bytes`. An item that alone exceeds `max_bytes` is sent in
/// a batch of one rather than dropped or rejected.
///
/// Size accounting mirrors the Python exactly: each batch starts at 2
/// bytes (for the `[]` wrapper), and each item contributes
/// `len(json.dumps(item)) + 2` (for the `", "` separator) even though
/// the last item in a batch doesn't actually need one — this matches
/// the original's slightly conservative estimate rather than an exact
/// byte count.
pub fn batch_by_size(items: &[Value], max_bytes: usize) -> Vec<Vec<Value>> {
    let mut batches = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    let mut current_size: usize = 2;

    for item in items {
        let item_size = serde_json::to_string(item).map(|s| s.len()).unwrap_or(0) + 2;

        if item_size > max_bytes {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_size = 2;
            }
            batches.push(vec![item.clone()]);
            continue;
        }

        if current_size + item_size > max_bytes && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_size = 2;
        }

        current.push(item.clone());
        current_size += item_size;
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// Simple fixed-size chunking, used for job I/O link batches.
pub fn batch_by_count(items: &[Value], batch_size: usize) -> Vec<Vec<Value>> {
    if batch_size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(batch_size).map(|c| c.to_vec()).collect()
}
