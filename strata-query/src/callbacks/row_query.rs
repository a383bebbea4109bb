//! Built-in row query pipeline: select into an unmanaged cursor.

use super::Step;
use crate::error::QueryResult;
use crate::scope::Scope;

pub(super) fn steps() -> Vec<Step> {
    vec![Step::new("strata:row_query", false, row_query)]
}

fn row_query(scope: &mut Scope<'_>) -> QueryResult<()> {
    let b = scope.build_select()?;
    let rows = scope.query(b)?;
    scope.set_rows_affected(rows.len() as u64);
    scope.rows = Some(rows);
    Ok(())
}
