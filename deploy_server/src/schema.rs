//! Diesel table definition for deployed projects.

diesel::table! {
    deploy_projects (id) {
        id -> Int8,
        project_id -> Varchar,
        name -> Varchar,
        status -> Varchar,
        url -> Nullable<Varchar>,
        thumbnail -> Text,
        error -> Nullable<Text>,
        build_started_at -> Nullable<Timestamptz>,
        build_completed_at -> Nullable<Timestamptz>,
        build_time_ms -> Nullable<Int8>,
        thumbnail_updated_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
