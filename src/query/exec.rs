use bson::Document as BsonDocument;

use crate::model::DocumentKey;

use super::descriptor::{ExecutionTarget, QueryDescriptor};
use super::eval::{after_start, before_end, compare_docs, eval_filter, has_order_fields};

/// Runs a descriptor over an in-memory set of documents and returns the
/// matching documents in query order.
pub fn run_query<'a, I>(query: &QueryDescriptor, docs: I) -> Vec<(DocumentKey, BsonDocument)>
where
    I: IntoIterator<Item = (&'a DocumentKey, &'a BsonDocument)>,
{
    let bench_start = std::time::Instant::now();
    let target = query.to_execution_target();
    let out = run_target(&target, docs);
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"run\",\"collection\":\"{}\",\"duration_ms\":{},\"result_count\":{},\"limit\":{},\"reversed\":{}}}",
        target.path,
        bench_start.elapsed().as_millis(),
        out.len(),
        target.limit.unwrap_or(0),
        target.reverse_results
    );
    out
}

fn run_target<'a, I>(target: &ExecutionTarget, docs: I) -> Vec<(DocumentKey, BsonDocument)>
where
    I: IntoIterator<Item = (&'a DocumentKey, &'a BsonDocument)>,
{
    let mut matched: Vec<(&DocumentKey, &BsonDocument)> = docs
        .into_iter()
        .filter(|(k, _)| k.collection_path() == target.path)
        .filter(|(k, d)| has_order_fields(k, d, &target.order_bys))
        .filter(|(k, d)| target.filters.iter().all(|f| eval_filter(k, d, f)))
        .filter(|(k, d)| target.start_at.as_ref().is_none_or(|b| after_start(k, d, b, &target.order_bys)))
        .filter(|(k, d)| target.end_at.as_ref().is_none_or(|b| before_end(k, d, b, &target.order_bys)))
        .collect();
    matched.sort_by(|a, b| compare_docs(*a, *b, &target.order_bys));
    if let Some(n) = target.limit {
        matched.truncate(n as usize);
    }
    if target.reverse_results {
        matched.reverse();
    }
    matched.into_iter().map(|(k, d)| (k.clone(), d.clone())).collect()
}
