use serde_json::Value;
use sqlx::{postgres::PgArguments, Arguments, FromRow, PgPool};
use sqlx::postgres::PgRow;

use crate::database::manager::DatabaseError;
use crate::database::store::Listing;
use crate::filter::{Filter, FilterData, FilterError, SqlResult};

impl From<FilterError> for DatabaseError {
    fn from(err: FilterError) -> Self {
        DatabaseError::QueryError(err.to_string())
    }
}

/// Filtered reads over one table
pub struct Repository<T> {
    table_name: &'static str,
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Repository<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(table_name: &'static str, pool: PgPool) -> Self {
        Self {
            table_name,
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    fn filter(&self, filter_data: FilterData) -> Result<Filter, DatabaseError> {
        let mut filter = Filter::new(self.table_name)?;
        filter.assign(filter_data)?;
        Ok(filter)
    }

    pub async fn select_any(&self, filter_data: FilterData) -> Result<Vec<T>, DatabaseError> {
        let sql = self.filter(filter_data)?.to_sql()?;
        let args = bind_params(&sql);
        Ok(sqlx::query_as_with::<_, T, _>(&sql.query, args).fetch_all(&self.pool).await?)
    }

    pub async fn select_one(&self, filter_data: FilterData) -> Result<Option<T>, DatabaseError> {
        let sql = self.filter(filter_data)?.to_sql()?;
        let args = bind_params(&sql);
        Ok(sqlx::query_as_with::<_, T, _>(&sql.query, args).fetch_optional(&self.pool).await?)
    }

    pub async fn count(&self, filter_data: FilterData) -> Result<i64, DatabaseError> {
        let sql = self.filter(filter_data)?.to_count_sql()?;
        let args = bind_params(&sql);
        Ok(sqlx::query_scalar_with::<_, i64, _>(&sql.query, args).fetch_one(&self.pool).await?)
    }

    /// One page plus the total count of rows matching the same where clause.
    pub async fn select_page(&self, filter_data: FilterData) -> Result<Listing<T>, DatabaseError> {
        let count_filter = FilterData {
            where_clause: filter_data.where_clause.clone(),
            ..Default::default()
        };
        let total = self.count(count_filter).await?;
        let items = self.select_any(filter_data).await?;
        Ok(Listing { total, items })
    }
}

/// Positional arguments for a rendered filter. Arrays are already expanded to one
/// placeholder per element, so only scalars normally reach this point.
fn bind_params(sql: &SqlResult) -> PgArguments {
    let mut args = PgArguments::default();
    for value in &sql.params {
        match value {
            Value::Null => args.add(None::<String>),
            Value::Bool(b) => args.add(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => args.add(i),
                (None, Some(f)) => args.add(f),
                (None, None) => args.add(n.to_string()),
            },
            Value::String(s) => args.add(s.clone()),
            Value::Array(_) | Value::Object(_) => args.add(value.clone()),
        }
    }
    args
}
