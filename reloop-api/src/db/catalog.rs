//! Catalog queries: devices, components and teardown steps
//!
//! Read-only during normal operation. The upserts exist for catalog seeding.

use reloop_common::db::{parse_uuid, Component, Device, HazardLevel, TeardownStep};
use reloop_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

fn component_from_row(row: &SqliteRow) -> Result<Component> {
    let id: String = row.get("id");
    let device_id: String = row.get("device_id");
    Ok(Component {
        id: parse_uuid("id", &id)?,
        device_id: parse_uuid("device_id", &device_id)?,
        name: row.get("name"),
        kind: row.get("type"),
        value: row.get("value"),
    })
}

fn json_list(column: &str, value: Option<String>) -> Result<Vec<String>> {
    match value {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)
            .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e))),
        _ => Ok(Vec::new()),
    }
}

fn step_from_row(row: &SqliteRow) -> Result<TeardownStep> {
    let id: String = row.get("id");
    let device_id: String = row.get("device_id");
    let hazard: String = row.get("hazard_level");

    let educational_context: Option<String> = row.get("educational_context");
    let educational_context = educational_context
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize educational_context: {}", e)))?;

    Ok(TeardownStep {
        id: parse_uuid("id", &id)?,
        device_id: parse_uuid("device_id", &device_id)?,
        step_number: row.get("step_number"),
        title: row.get("title"),
        description: row.get("description"),
        image_url: row.get("image_url"),
        instructions: json_list("instructions", row.get("instructions"))?,
        // Unknown levels render as low rather than failing the whole sequence
        hazard_level: hazard.parse().unwrap_or(HazardLevel::Low),
        has_safety_gate: row.get::<i64, _>("has_safety_gate") != 0,
        power_off_required: row.get::<i64, _>("power_off_required") != 0,
        ppe_required: json_list("ppe_required", row.get("ppe_required"))?,
        safety_warnings: json_list("safety_warnings", row.get("safety_warnings"))?,
        educational_context,
    })
}

/// All devices with their components, ordered by name
pub async fn list_devices(pool: &SqlitePool) -> Result<Vec<Device>> {
    let device_rows = sqlx::query(
        "SELECT id, name, category, image_url, total_value FROM devices ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;

    let component_rows = sqlx::query(
        "SELECT id, device_id, name, type, value FROM device_components ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut components: HashMap<Uuid, Vec<Component>> = HashMap::new();
    for row in &component_rows {
        let component = component_from_row(row)?;
        components.entry(component.device_id).or_default().push(component);
    }

    device_rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let id = parse_uuid("id", &id)?;
            Ok(Device {
                id,
                name: row.get("name"),
                category: row.get("category"),
                image_url: row.get("image_url"),
                total_value: row.get("total_value"),
                components: components.remove(&id).unwrap_or_default(),
            })
        })
        .collect()
}

/// One device with its components
pub async fn get_device(pool: &SqlitePool, device_id: Uuid) -> Result<Option<Device>> {
    let row = sqlx::query(
        "SELECT id, name, category, image_url, total_value FROM devices WHERE id = ?",
    )
    .bind(device_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let component_rows = sqlx::query(
        "SELECT id, device_id, name, type, value FROM device_components WHERE device_id = ? ORDER BY name ASC",
    )
    .bind(device_id.to_string())
    .fetch_all(pool)
    .await?;

    let components = component_rows
        .iter()
        .map(component_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(Device {
        id: device_id,
        name: row.get("name"),
        category: row.get("category"),
        image_url: row.get("image_url"),
        total_value: row.get("total_value"),
        components,
    }))
}

/// Steps of a device in ascending `step_number` order
pub async fn list_steps(pool: &SqlitePool, device_id: Uuid) -> Result<Vec<TeardownStep>> {
    let rows = sqlx::query(
        r#"
        SELECT id, device_id, step_number, title, description, image_url, instructions,
               hazard_level, has_safety_gate, power_off_required, ppe_required,
               safety_warnings, educational_context
        FROM teardown_steps
        WHERE device_id = ?
        ORDER BY step_number ASC
        "#,
    )
    .bind(device_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(step_from_row).collect()
}

pub async fn upsert_device(pool: &SqlitePool, device: &Device) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO devices (id, name, category, image_url, total_value)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            image_url = excluded.image_url,
            total_value = excluded.total_value
        "#,
    )
    .bind(device.id.to_string())
    .bind(&device.name)
    .bind(&device.category)
    .bind(&device.image_url)
    .bind(device.total_value)
    .execute(pool)
    .await?;

    for component in &device.components {
        sqlx::query(
            r#"
            INSERT INTO device_components (id, device_id, name, type, value)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                device_id = excluded.device_id,
                name = excluded.name,
                type = excluded.type,
                value = excluded.value
            "#,
        )
        .bind(component.id.to_string())
        .bind(device.id.to_string())
        .bind(&component.name)
        .bind(&component.kind)
        .bind(component.value)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn upsert_step(pool: &SqlitePool, step: &TeardownStep) -> Result<()> {
    let to_json = |column: &str, value: &Vec<String>| {
        serde_json::to_string(value)
            .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
    };
    let instructions = to_json("instructions", &step.instructions)?;
    let ppe_required = to_json("ppe_required", &step.ppe_required)?;
    let safety_warnings = to_json("safety_warnings", &step.safety_warnings)?;
    let educational_context = step
        .educational_context
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize educational_context: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO teardown_steps (
            id, device_id, step_number, title, description, image_url, instructions,
            hazard_level, has_safety_gate, power_off_required, ppe_required,
            safety_warnings, educational_context
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            step_number = excluded.step_number,
            title = excluded.title,
            description = excluded.description,
            image_url = excluded.image_url,
            instructions = excluded.instructions,
            hazard_level = excluded.hazard_level,
            has_safety_gate = excluded.has_safety_gate,
            power_off_required = excluded.power_off_required,
            ppe_required = excluded.ppe_required,
            safety_warnings = excluded.safety_warnings,
            educational_context = excluded.educational_context
        "#,
    )
    .bind(step.id.to_string())
    .bind(step.device_id.to_string())
    .bind(step.step_number)
    .bind(&step.title)
    .bind(&step.description)
    .bind(&step.image_url)
    .bind(instructions)
    .bind(step.hazard_level.as_str())
    .bind(step.has_safety_gate as i64)
    .bind(step.power_off_required as i64)
    .bind(ppe_required)
    .bind(safety_warnings)
    .bind(educational_context)
    .execute(pool)
    .await?;

    Ok(())
}
