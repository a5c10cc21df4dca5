//! OpenAPI 3.0 document, assembled programmatically.
//!
//! Deliberately schema-light: every route is present with its documented
//! status codes so clients can discover the surface and error space, but
//! body schemas stay loose objects.

use serde_json::{json, Map, Value};

/// Build the document for the given base path (e.g. `/v0`).
pub fn document(base_path: &str) -> Value {
    let mut paths = Map::new();

    let mut add = |path: &str, methods: &[(&str, &str, &[u16])]| {
        let mut item = Map::new();
        if path.contains('{') {
            item.insert("parameters".to_string(), path_parameters(path));
        }
        for (method, summary, codes) in methods {
            item.insert(
                method.to_string(),
                operation(summary, codes, matches!(*method, "post" | "patch")),
            );
        }
        paths.insert(format!("{base_path}{path}"), Value::Object(item));
    };

    add(
        "/projects",
        &[
            ("post", "Create a project", &[201, 400, 401, 409]),
            ("get", "List projects", &[200]),
        ],
    );
    add(
        "/projects/{project_id}/config",
        &[("get", "Project configuration", &[200, 404])],
    );
    add(
        "/projects/{project_id}/tasks",
        &[
            ("post", "Create a task", &[201, 400, 401, 403, 404, 409]),
            ("get", "List tasks", &[200, 400, 404]),
        ],
    );
    add(
        "/projects/{project_id}/tasks/tree",
        &[("get", "Task parent/child tree", &[200, 404])],
    );
    add(
        "/projects/{project_id}/tasks/{id}",
        &[
            ("get", "Fetch a task", &[200, 404]),
            (
                "patch",
                "Update a task",
                &[200, 400, 401, 403, 404, 409, 422],
            ),
        ],
    );
    add(
        "/projects/{project_id}/tasks/{id}/claim",
        &[("post", "Claim the work lease", &[200, 401, 403, 404, 409])],
    );
    add(
        "/projects/{project_id}/tasks/{id}/release",
        &[("post", "Release the work lease", &[204, 401, 403, 404])],
    );
    add(
        "/projects/{project_id}/tasks/{id}/done",
        &[(
            "post",
            "Complete a task",
            &[200, 400, 401, 403, 404, 422],
        )],
    );
    add(
        "/projects/{project_id}/tasks/{id}/validation",
        &[("get", "Task validation status", &[200, 404])],
    );
    add(
        "/projects/{project_id}/iterations",
        &[
            ("post", "Create an iteration", &[201, 400, 401, 403, 409]),
            ("get", "List iterations", &[200, 400, 404]),
        ],
    );
    add(
        "/projects/{project_id}/iterations/{id}/status",
        &[(
            "patch",
            "Set iteration status",
            &[200, 400, 401, 403, 404, 422],
        )],
    );
    add(
        "/projects/{project_id}/decisions",
        &[
            ("post", "Record a decision", &[201, 400, 401, 403, 409]),
            ("get", "List decisions", &[200, 400, 404]),
        ],
    );
    add(
        "/projects/{project_id}/attestations",
        &[
            (
                "post",
                "Record an attestation",
                &[201, 400, 401, 403, 404],
            ),
            ("get", "List attestations", &[200, 400, 404]),
        ],
    );
    add(
        "/projects/{project_id}/events",
        &[("get", "List events", &[200, 400, 404])],
    );
    add(
        "/projects/{project_id}/rbac/roles/grant",
        &[("post", "Grant a role", &[200, 400, 401, 403, 404])],
    );
    add(
        "/projects/{project_id}/rbac/roles/revoke",
        &[("post", "Revoke a role", &[200, 400, 401, 403, 404])],
    );
    add(
        "/projects/{project_id}/rbac/authorities",
        &[(
            "post",
            "Map an attestation kind to a role",
            &[200, 400, 401, 403, 404],
        )],
    );
    add(
        "/projects/{project_id}/me/permissions",
        &[("get", "Caller roles and permissions", &[200, 401, 404])],
    );

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Proofline API",
            "description": "Project-workflow control plane: tasks, iterations, decisions, attestations, leases and events.",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
        "components": {
            "schemas": {
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": {
                            "type": "object",
                            "properties": {
                                "code": {
                                    "type": "string",
                                    "enum": [
                                        "bad_request", "not_found", "forbidden",
                                        "forbidden_attestation_kind", "lease_conflict",
                                        "conflict", "invalid_transition",
                                        "validation_failed", "canceled", "internal"
                                    ],
                                },
                                "message": {"type": "string"},
                                "details": {"type": "object", "additionalProperties": true},
                            },
                            "required": ["code", "message"],
                        }
                    },
                    "required": ["error"],
                }
            },
            "securitySchemes": {
                "actorHeader": {
                    "type": "apiKey",
                    "in": "header",
                    "name": "X-Actor-Id",
                }
            }
        },
    })
}

fn operation(summary: &str, codes: &[u16], has_body: bool) -> Value {
    let mut responses = Map::new();
    for code in codes {
        let description = status_description(*code);
        let mut response = json!({"description": description});
        if *code >= 400 {
            response["content"] = json!({
                "application/json": {
                    "schema": {"$ref": "#/components/schemas/Error"}
                }
            });
        } else if *code != 204 {
            response["content"] = json!({
                "application/json": {
                    "schema": {"type": "object", "additionalProperties": true}
                }
            });
        }
        responses.insert(code.to_string(), response);
    }
    let mut op = json!({
        "summary": summary,
        "responses": responses,
    });
    if has_body {
        op["requestBody"] = json!({
            "content": {
                "application/json": {
                    "schema": {"type": "object", "additionalProperties": true}
                }
            }
        });
    }
    op
}

fn path_parameters(path: &str) -> Value {
    let params: Vec<Value> = path
        .split('/')
        .filter(|segment| segment.starts_with('{') && segment.ends_with('}'))
        .map(|segment| {
            let name = segment.trim_matches(&['{', '}'][..]);
            json!({
                "name": name,
                "in": "path",
                "required": true,
                "schema": {"type": "string"},
            })
        })
        .collect();
    Value::Array(params)
}

fn status_description(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad request",
        401 => "Actor header required",
        403 => "Forbidden",
        404 => "Not found",
        409 => "Conflict",
        422 => "Unprocessable entity",
        _ => "Error",
    }
}
