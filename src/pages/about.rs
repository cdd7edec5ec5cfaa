use super::PageResult;
use crate::gate::{handler_fn, Handler};

pub fn page() -> impl Handler<Output = PageResult> + Send + Sync {
    handler_fn("about", |_req| -> PageResult {
        Ok(concat!(
            "# About\n\n",
            "dashgate is a starter for multi-page data dashboards with routing,\n",
            "session authentication and activity logging built in.\n",
        )
        .to_string())
    })
}
