/*!
# Telecaller Daily Report Dashboard

Backend of a small internal dashboard: telecallers submit daily performance
reports, admins review them and manage accounts, and the numbers are aggregated
for charts.

## Architecture

### Storage Layer
- **Record store** - one trait for row-level access to three tables (Users,
  Reports, EditLogs)
- **Remote store** - Google Sheets values API, one worksheet per table
- **Local store** - one pretty-printed JSON file per table
- **Fallback** - the remote store is used while it answers; the first
  connection failure switches to the local files for the rest of the process

### Service Layer
- **Authentication** - SHA-256 password check yielding an explicit `Actor`
- **Reports** - one report per telecaller per day, overwrites recorded in the
  edit history
- **Users** - admin-only account management
- **Analytics** - pure aggregation over report lists
- **Export** - CSV and XLSX downloads

### Presentation Layer (feature `web`)
- JSON HTTP API with cookie sessions
- `dashboard-cli` for administration from a terminal

## Modules

- **error**: Error enum shared by every layer
- **config**: Environment configuration
- **clock**: Time source and date formats
- **schema**: Table layout, row keys and rows
- **store**: Record store trait and its backends
- **models**: Users, reports and edit history entries
- **auth**: Password hashing, login and caller permissions
- **users**: Account management
- **reports**: Report submission, listing and edit history
- **analytics**: Aggregations for the charts
- **downloader**: CSV/XLSX export
- **app**: Routing and handlers
*/

pub mod analytics;
pub mod auth;
pub mod clock;
pub mod config;
pub mod downloader;
pub mod error;
pub mod models;
pub mod reports;
pub mod schema;
pub mod store;
pub mod users;

#[cfg(feature = "web")]
pub mod app;

pub use error::{DashboardError, Result};
