mod dashboard;
mod row_detail;
mod table;

pub use dashboard::DashboardView;
pub use row_detail::RowDetailView;
pub use table::TableView;
