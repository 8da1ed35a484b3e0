use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::app::registry::EntityRegistry;
use crate::app::runtime::HostCommand;
use crate::domain::models::DeviceId;

#[derive(Clone)]
pub struct ApiState {
    pub registry: EntityRegistry,
    pub commands: mpsc::UnboundedSender<HostCommand>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub device_id: DeviceId,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
    pub entity_ids: Vec<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_entities_endpoint)
        .service(get_entity_endpoint)
        .service(list_devices_endpoint)
        .service(remove_device_endpoint)
        .service(reload_entry_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/entities")]
async fn list_entities_endpoint(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.registry.entities())
}

#[get("/entities/{unique_id}")]
async fn get_entity_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.registry.entity(&path) {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "entity not found"
        })),
    }
}

#[get("/devices")]
async fn list_devices_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let entities = state.registry.entities();
    let mapped: Vec<DeviceResponse> = state
        .registry
        .devices()
        .into_iter()
        .map(|info| {
            let device_id = info.identifiers.1;
            DeviceResponse {
                device_id,
                name: info.name,
                manufacturer: info.manufacturer,
                model: info.model,
                sw_version: info.sw_version,
                entity_ids: entities
                    .iter()
                    .filter(|snapshot| snapshot.device_id == device_id)
                    .map(|snapshot| snapshot.unique_id.clone())
                    .collect(),
            }
        })
        .collect();

    HttpResponse::Ok().json(mapped)
}

#[delete("/devices/{device_id}")]
async fn remove_device_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<i64>,
) -> impl Responder {
    let (reply, answer) = oneshot::channel();
    let command = HostCommand::RemoveDevice {
        device_id: DeviceId(path.into_inner()),
        reply,
    };
    if state.commands.send(command).is_err() {
        return supervisor_unavailable();
    }

    match answer.await {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "device not found"
        })),
        Err(_) => supervisor_unavailable(),
    }
}

#[post("/entry/reload")]
async fn reload_entry_endpoint(state: web::Data<ApiState>) -> impl Responder {
    if state.commands.send(HostCommand::Reload).is_err() {
        return supervisor_unavailable();
    }
    HttpResponse::Accepted().json(serde_json::json!({ "status": "reloading" }))
}

fn supervisor_unavailable() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "error": "entry supervisor is not running"
    }))
}
