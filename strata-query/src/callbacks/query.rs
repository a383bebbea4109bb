//! Built-in query pipeline.

use super::Step;
use crate::associations;
use crate::error::{QueryError, QueryResult};
use crate::model::{Hook, Target, scan_row_into};
use crate::scope::Scope;

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new("strata:query", false, query),
        Step::new("strata:preload", false, associations::preload),
        Step::new("strata:after_query", false, |scope| {
            scope.call_hooks(&[Hook::AfterFind])
        }),
    ]
}

/// Select and scan into the target. A single target that matches no row
/// is a not-found error; a sequence target is reset first.
fn query(scope: &mut Scope<'_>) -> QueryResult<()> {
    let b = scope.build_select()?;
    let rows = scope.query(b)?.into_vec();
    scope.set_rows_affected(rows.len() as u64);

    match scope.target_mut() {
        Target::None => Ok(()),
        Target::One(record) => {
            let Some(row) = rows.first() else {
                return Err(QueryError::not_found(record.descriptor().type_name));
            };
            scan_row_into(&mut **record, row)
        }
        Target::Many(list) => {
            list.clear();
            for row in &rows {
                scan_row_into(list.push_default(), row)?;
            }
            Ok(())
        }
    }
}
