//! The four fixed record kinds, their upstream column maps and storage layouts.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Timestamp,
    Date,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "bigint",
            Self::Float => "double precision",
            Self::Timestamp => "timestamptz",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

use ColumnKind::{Date, Float, Integer, Text, Timestamp};

const LEADS_COLUMNS: &[ColumnSpec] = &[
    col("name", Text),
    col("email", Text),
    col("phone_number", Text),
    col("city", Text),
    col("question_1", Text),
    col("utm_source", Text),
    col("utm_medium", Text),
    col("utm_camp", Text),
    col("created_date", Timestamp),
    col("ad_name", Text),
    col("user_id", Text),
    col("source_sheet", Text),
];

const TRANSACTIONS_COLUMNS: &[ColumnSpec] = &[
    col("mongo_id", Text),
    col("status", Text),
    col("txn_id", Text),
    col("sid", Text),
    col("emi_id", Text),
    col("pid", Text),
    col("payment_gateway", Text),
    col("target", Text),
    col("target_super_group", Text),
    col("course_name", Text),
    col("source", Text),
    col("token_amount", Float),
    col("without_token_paid_amount", Float),
    col("created_on", Timestamp),
    col("p_type", Text),
    col("ebook_rev", Float),
    col("book_rev", Float),
    col("payment_type", Text),
    col("dp", Float),
    col("total_emis", Integer),
    col("last_emi_date", Text),
    col("total_emis_due", Integer),
    col("total_timely_emis_paid", Integer),
    col("paid_amount", Float),
    col("core_partner", Text),
    col("student_email", Text),
    col("student_contact", Text),
    col("student_signup_date", Text),
    col("student_name", Text),
    col("total_amount", Float),
    col("product", Text),
    col("mandate_status", Text),
    col("ebook_net_amount", Float),
    col("book_net_amount", Float),
    col("product_net_amount", Float),
    col("net_amount", Float),
    col("employee_name", Text),
    col("employee_team", Text),
    col("total_emi", Integer),
    col("paid_emi_count", Integer),
    col("unpaid_emi_count", Integer),
    col("paid_emi_amount", Float),
    col("unpaid_amount", Float),
    col("last_paid_date", Text),
    col("net_amount_after_pdd", Float),
];

const ASSIGNMENTS_COLUMNS: &[ColumnSpec] = &[
    col("sources", Text),
    col("assign_on", Timestamp),
    col("lead_mobile", Text),
    col("employee", Text),
];

const WEBINAR_COLUMNS: &[ColumnSpec] = &[
    col("mon", Text),
    col("webinar_date", Date),
    col("category", Text),
    col("attended", Text),
    col("user_name", Text),
    col("first_name", Text),
    col("last_name", Text),
    col("email", Text),
    col("phone", Text),
    col("registration_time", Timestamp),
    col("approval_status", Text),
    col("join_time", Timestamp),
    col("leave_time", Timestamp),
    col("time_in_session_minutes", Integer),
    col("is_guest", Text),
    col("country_region_name", Text),
    col("source", Text),
    col("user_id", Text),
    col("source_sheet", Text),
];

const LEADS_MAP: &[(&str, &str)] = &[
    ("Name", "name"),
    ("Full name", "name"),
    ("Email", "email"),
    ("Phone number", "phone_number"),
    ("City", "city"),
    ("Question 1", "question_1"),
    ("utmSource", "utm_source"),
    ("utmMedium", "utm_medium"),
    ("utmCamp", "utm_camp"),
    ("created date", "created_date"),
    ("ad name", "ad_name"),
];

const TRANSACTIONS_MAP: &[(&str, &str)] = &[
    ("_id", "mongo_id"),
    ("status", "status"),
    ("txn_id", "txn_id"),
    ("sid", "sid"),
    ("emiId", "emi_id"),
    ("pId", "pid"),
    ("paymentGateway", "payment_gateway"),
    ("target", "target"),
    ("targetSuperGroup", "target_super_group"),
    ("courseName", "course_name"),
    ("source", "source"),
    ("tokenAmount", "token_amount"),
    ("WithOut_Token_paidAmount", "without_token_paid_amount"),
    ("createdOn", "created_on"),
    ("pType", "p_type"),
    ("eBookRev", "ebook_rev"),
    ("bookRev", "book_rev"),
    ("paymentType", "payment_type"),
    ("DP", "dp"),
    ("Total_emis", "total_emis"),
    ("lastEmiDate", "last_emi_date"),
    ("total_emis_due", "total_emis_due"),
    ("Total_Timely_EMIs_paid", "total_timely_emis_paid"),
    ("paidAmount", "paid_amount"),
    ("corePartner", "core_partner"),
    ("StudentEmail", "student_email"),
    ("StudentContact", "student_contact"),
    ("StudentSignupDate", "student_signup_date"),
    ("StudentName", "student_name"),
    ("TotalAmount", "total_amount"),
    ("product", "product"),
    ("mandateStatus", "mandate_status"),
    ("EBook_Net_Amount", "ebook_net_amount"),
    ("Book_Net_Amount", "book_net_amount"),
    ("Product_Net_Amount", "product_net_amount"),
    ("netAmount", "net_amount"),
    ("employeeName", "employee_name"),
    ("employeeTeam", "employee_team"),
    ("Total_emi", "total_emi"),
    ("Paid_Emi_Count", "paid_emi_count"),
    ("Unpaid_Emi_Count", "unpaid_emi_count"),
    ("Paid_Emi_Amount", "paid_emi_amount"),
    ("Unpaid_Amount", "unpaid_amount"),
    ("Last_Paid_Date", "last_paid_date"),
    ("netAmountAfterPDD", "net_amount_after_pdd"),
];

const ASSIGNMENTS_MAP: &[(&str, &str)] = &[
    ("sources", "sources"),
    ("assignOn", "assign_on"),
    ("leadMobile", "lead_mobile"),
    ("employee", "employee"),
];

const WEBINAR_MAP: &[(&str, &str)] = &[
    ("Mon", "mon"),
    ("Webinar Date", "webinar_date"),
    ("Category", "category"),
    ("Attended", "attended"),
    ("User Name (Original Name)", "user_name"),
    ("First Name", "first_name"),
    ("Last Name", "last_name"),
    ("Email", "email"),
    ("Phone", "phone"),
    ("Registration Time", "registration_time"),
    ("Approval Status", "approval_status"),
    ("Join Time", "join_time"),
    ("Leave Time", "leave_time"),
    ("Time in Session (minutes)", "time_in_session_minutes"),
    ("Is Guest", "is_guest"),
    ("Country/Region Name", "country_region_name"),
    ("Source", "source"),
];

/// Static rename table from upstream header names to storage column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    entries: &'static [(&'static str, &'static str)],
}

impl ColumnMap {
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }

    pub fn storage_for(&self, upstream: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(from, _)| *from == upstream)
            .map(|(_, to)| *to)
    }

    /// Upstream names that feed a storage column, in declaration order.
    pub fn upstream_for(&self, storage: &str) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, to)| *to == storage)
            .map(|(from, _)| *from)
            .collect()
    }

    /// Distinct storage columns in declaration order.
    pub fn storage_columns(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for (_, to) in self.entries {
            if !out.contains(to) {
                out.push(to);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Leads,
    Transactions,
    Assignments,
    Webinar,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        Self::Leads,
        Self::Transactions,
        Self::Assignments,
        Self::Webinar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leads => "leads",
            Self::Transactions => "transactions",
            Self::Assignments => "assignments",
            Self::Webinar => "webinar",
        }
    }

    pub fn default_table(self) -> &'static str {
        match self {
            Self::Leads => "tofu_leads",
            Self::Transactions => "bofu_transactions",
            Self::Assignments => "mofu_lead_assignments",
            Self::Webinar => "zoom_webinar_attendance",
        }
    }

    pub fn column_map(self) -> ColumnMap {
        match self {
            Self::Leads => ColumnMap::new(LEADS_MAP),
            Self::Transactions => ColumnMap::new(TRANSACTIONS_MAP),
            Self::Assignments => ColumnMap::new(ASSIGNMENTS_MAP),
            Self::Webinar => ColumnMap::new(WEBINAR_MAP),
        }
    }

    pub fn storage_columns(self) -> &'static [ColumnSpec] {
        match self {
            Self::Leads => LEADS_COLUMNS,
            Self::Transactions => TRANSACTIONS_COLUMNS,
            Self::Assignments => ASSIGNMENTS_COLUMNS,
            Self::Webinar => WEBINAR_COLUMNS,
        }
    }

    /// Column holding the source tag the watermark is scoped by.
    pub fn source_column(self) -> Option<&'static str> {
        match self {
            Self::Leads | Self::Webinar => Some("source_sheet"),
            Self::Assignments => Some("sources"),
            Self::Transactions => None,
        }
    }

    pub fn watermark_column(self) -> Option<&'static str> {
        match self {
            Self::Leads => Some("created_date"),
            Self::Assignments => Some("assign_on"),
            Self::Webinar => Some("webinar_date"),
            Self::Transactions => None,
        }
    }

    pub fn schema(self, table: impl Into<String>) -> TableSchema {
        TableSchema {
            kind: self,
            table: table.into(),
            columns: self.storage_columns().to_vec(),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub kind: RecordKind,
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}
