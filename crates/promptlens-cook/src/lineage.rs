//! Lineage reconstruction: assign each cooked request a parent, or mark it
//! a forest root.
//!
//! Lineage is inferred from payload content alone. A call's parent is the
//! earlier same-model call whose expected prefix (its request messages plus
//! its response messages) is closest, by edit distance over message-id
//! lists, to this call's request prefix, subject to a tool-set divergence
//! penalty and a length-scaled acceptance threshold. Rewinds therefore link
//! to the older call they actually extend, not to the newest call.

use std::collections::HashSet;

use crate::record::CookedRequest;

/// Assign `parent_id` across the whole request list. Error-flagged slots
/// are left as roots and never considered as candidates.
pub fn assign_parents(requests: &mut [CookedRequest]) {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| {
        (requests[a].timestamp, &requests[a].id).cmp(&(requests[b].timestamp, &requests[b].id))
    });

    let mut parents: Vec<Option<String>> = vec![None; requests.len()];

    for &i in &order {
        if requests[i].error.is_some() {
            continue;
        }
        let r = &requests[i];

        // Candidates: strictly earlier, same model, usable.
        let mut candidates: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&j| {
                j != i
                    && requests[j].error.is_none()
                    && requests[j].timestamp < r.timestamp
                    && requests[j].model == r.model
            })
            .collect();
        // Newest first, so equal scores resolve to the most recent call.
        candidates.sort_by(|&a, &b| {
            (requests[b].timestamp, &requests[b].id).cmp(&(requests[a].timestamp, &requests[a].id))
        });

        let r_tools: HashSet<&str> = r.tools.iter().map(String::as_str).collect();
        let mut best: Option<(f64, usize)> = None;

        for j in candidates {
            let c = &requests[j];
            let expected: Vec<&str> = c
                .request_messages
                .iter()
                .chain(c.response_messages.iter())
                .map(String::as_str)
                .collect();
            let prefix: Vec<&str> = r.request_messages.iter().map(String::as_str).collect();

            let message_score = -(levenshtein(&expected, &prefix) as f64);
            let c_tools: HashSet<&str> = c.tools.iter().map(String::as_str).collect();
            let tool_score = -0.5 * c_tools.symmetric_difference(&r_tools).count() as f64;
            let total = message_score + tool_score;

            if best.map_or(true, |(score, _)| total > score) {
                best = Some((total, j));
            }
        }

        let threshold = -0.5 * r.request_messages.len() as f64;
        parents[i] = match best {
            Some((score, j)) if score >= threshold => Some(requests[j].id.clone()),
            _ => None,
        };
    }

    for (request, parent) in requests.iter_mut().zip(parents) {
        request.parent_id = parent;
    }
}

/// Unit-cost edit distance (add / delete / substitute) over id lists;
/// equal elements inherit the diagonal.
fn levenshtein(a: &[&str], b: &[&str]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ai) in a.iter().enumerate() {
        let mut cur = Vec::with_capacity(b.len() + 1);
        cur.push(i + 1);
        for (j, bj) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ai != bj);
            let delete = prev[j + 1] + 1;
            let add = cur[j] + 1;
            cur.push(substitute.min(delete).min(add));
        }
        prev = cur;
    }
    prev[b.len()]
}
