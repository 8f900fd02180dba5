//! Parquet fixtures for tests.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

/// One row of the monthly market export.
#[derive(Debug, Clone)]
pub struct MarketRecord {
    pub period: &'static str,
    pub region: &'static str,
    pub insurance_type: &'static str,
    pub business_type: &'static str,
    pub company: &'static str,
    pub premium: f64,
    pub policies: i64,
}

pub fn record(
    period: &'static str,
    region: &'static str,
    company: &'static str,
    premium: f64,
    policies: i64,
) -> MarketRecord {
    MarketRecord {
        period,
        region,
        insurance_type: "商业险",
        business_type: "新车",
        company,
        premium,
        policies,
    }
}

/// Two regions over June and July.
pub fn sample_records() -> Vec<MarketRecord> {
    vec![
        record("2024-06", "成都", "人保", 1000.0, 10),
        record("2024-06", "绵阳", "平安", 300.0, 4),
        record("2024-07", "成都", "平安", 1500.0, 12),
        MarketRecord {
            insurance_type: "交强险",
            business_type: "续保",
            ..record("2024-07", "绵阳", "人保", 200.0, 6)
        },
    ]
}

/// Column names in contract order, plus company and an extra channel column.
const COLUMNS: [&str; 8] = ["年月", "标准保费", "标准件数", "地市", "险种", "业务类型", "保险", "渠道"];

/// Encode records as parquet bytes, leaving out the named columns.
pub fn parquet_without(records: &[MarketRecord], skip: &[&str]) -> Bytes {
    let len = records.len();
    let mut period = StringBuilder::with_capacity(len, len * 8);
    let mut premium = Float64Builder::with_capacity(len);
    let mut policies = Int64Builder::with_capacity(len);
    let mut region = StringBuilder::with_capacity(len, len * 8);
    let mut insurance_type = StringBuilder::with_capacity(len, len * 8);
    let mut business_type = StringBuilder::with_capacity(len, len * 8);
    let mut company = StringBuilder::with_capacity(len, len * 8);
    let mut channel = StringBuilder::with_capacity(len, len * 8);

    for r in records {
        period.append_value(r.period);
        premium.append_value(r.premium);
        policies.append_value(r.policies);
        region.append_value(r.region);
        insurance_type.append_value(r.insurance_type);
        business_type.append_value(r.business_type);
        company.append_value(r.company);
        channel.append_value("直销");
    }

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(period.finish()),
        Arc::new(premium.finish()),
        Arc::new(policies.finish()),
        Arc::new(region.finish()),
        Arc::new(insurance_type.finish()),
        Arc::new(business_type.finish()),
        Arc::new(company.finish()),
        Arc::new(channel.finish()),
    ];

    let mut fields = Vec::new();
    let mut columns = Vec::new();
    for (name, array) in COLUMNS.iter().zip(arrays) {
        if skip.contains(name) {
            continue;
        }
        fields.push(Field::new(*name, array.data_type().clone(), false));
        columns.push(array);
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns).expect("valid batch");
    encode(&schema, &[batch])
}

pub fn parquet_bytes(records: &[MarketRecord]) -> Bytes {
    parquet_without(records, &[])
}

/// A valid parquet file with the full schema and no rows.
pub fn empty_parquet() -> Bytes {
    let schema = Arc::new(Schema::new(vec![
        Field::new("年月", DataType::Utf8, false),
        Field::new("标准保费", DataType::Float64, false),
    ]));
    encode(&schema, &[])
}

fn encode(schema: &Arc<Schema>, batches: &[RecordBatch]) -> Bytes {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buf, Arc::clone(schema), Some(props)).expect("writer");
    for batch in batches {
        writer.write(batch).expect("write batch");
    }
    writer.close().expect("close writer");
    Bytes::from(buf)
}
