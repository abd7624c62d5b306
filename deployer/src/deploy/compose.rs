//! Container definition files materialized on the remote host

use crate::models::deployment::CONTAINER_PORT;

/// Names derived for one deployment's container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNames {
    /// Remote working directory holding the definition files
    pub deployment_dir: String,
    pub container_name: String,
    pub image_name: String,
    pub volume_name: String,
}

impl ContainerNames {
    pub fn new(deployment_id: &str, model_id: &str) -> Self {
        let safe_model = docker_name(model_id);
        Self {
            deployment_dir: format!("~/aphrodite-deploy-{}", deployment_id),
            container_name: format!("aphrodite-{}-{}", safe_model, deployment_id),
            image_name: format!("aphrodite-engine-{}", safe_model),
            volume_name: format!("huggingface-cache-{}", deployment_id),
        }
    }
}

/// Reduce a model id to the container name charset `[a-z0-9_.-]`.
///
/// Names end up in compose YAML and in shell commands, so anything outside
/// the charset becomes `-`.
fn docker_name(model_id: &str) -> String {
    model_id
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// A file to write into the deployment directory
#[derive(Debug, Clone)]
pub struct DefinitionFile {
    pub name: &'static str,
    pub contents: String,
    pub executable: bool,
}

/// Every file the container build needs
pub fn definition_files(names: &ContainerNames, host_port: u16, auto_restart: bool) -> Vec<DefinitionFile> {
    vec![
        DefinitionFile {
            name: "Dockerfile",
            contents: dockerfile(),
            executable: false,
        },
        DefinitionFile {
            name: "docker-compose.yml",
            contents: compose_file(names, host_port, auto_restart),
            executable: false,
        },
        DefinitionFile {
            name: "run_aphrodite.py",
            contents: ENTRYPOINT.to_string(),
            executable: true,
        },
    ]
}

fn dockerfile() -> String {
    format!(
        r#"FROM python:3.10-slim

RUN apt-get update && \
    apt-get install -y git curl && \
    rm -rf /var/lib/apt/lists/*

WORKDIR /app

RUN git clone https://github.com/PygmalionAI/aphrodite-engine.git /app

ENV APHRODITE_TARGET_DEVICE=openvino
ENV APHRODITE_OPENVINO_KVCACHE_SPACE=8
ENV PIP_EXTRA_INDEX_URL=https://download.pytorch.org/whl/cpu
ENV HF_HOME=/root/.cache/huggingface

RUN mkdir -p /root/.cache/huggingface/hub

RUN pip install --no-cache-dir -r requirements-openvino.txt && \
    pip install --no-cache-dir -e .

COPY run_aphrodite.py /app/run_aphrodite.py
RUN chmod +x /app/run_aphrodite.py

EXPOSE {port}

ENTRYPOINT ["python", "/app/run_aphrodite.py"]"#,
        port = CONTAINER_PORT
    )
}

fn compose_file(names: &ContainerNames, host_port: u16, auto_restart: bool) -> String {
    let restart = if auto_restart { "unless-stopped" } else { "no" };
    format!(
        r#"services:
  aphrodite-engine:
    build:
      context: .
      dockerfile: Dockerfile
    image: {image}
    container_name: {container}
    ports:
      - "{host_port}:{container_port}"
    environment:
      - MODEL_ID=${{MODEL_ID:-gpt2}}
      - HUGGINGFACE_TOKEN=${{HUGGINGFACE_TOKEN}}
      - APHRODITE_OPENVINO_KVCACHE_SPACE=8
      - HF_HOME=/root/.cache/huggingface
    volumes:
      - huggingface-cache:/root/.cache/huggingface
    restart: "{restart}"

volumes:
  huggingface-cache:
    name: {volume}"#,
        image = names.image_name,
        container = names.container_name,
        host_port = host_port,
        container_port = CONTAINER_PORT,
        restart = restart,
        volume = names.volume_name,
    )
}

const ENTRYPOINT: &str = r#"#!/usr/bin/env python3
import os
import subprocess


def ensure_huggingface_cache_dir():
    hf_cache_dir = "/root/.cache/huggingface/hub"
    os.makedirs(hf_cache_dir, exist_ok=True)
    print(f"Ensured directory exists: {hf_cache_dir}")


def run_aphrodite():
    model_id = os.environ.get("MODEL_ID", "gpt2")
    cmd = ["aphrodite", "run", "--device", "openvino", "--host", "0.0.0.0", model_id]
    print("Running command:", " ".join(cmd))
    env = os.environ.copy()
    env["APHRODITE_OPENVINO_KVCACHE_SPACE"] = os.environ.get("APHRODITE_OPENVINO_KVCACHE_SPACE", "8")
    subprocess.check_call(cmd, env=env)


def main():
    if os.environ.get("HUGGINGFACE_TOKEN"):
        print("Hugging Face token is set.")
    print("Detected device: cpu (using OpenVINO backend)")
    ensure_huggingface_cache_dir()
    run_aphrodite()


if __name__ == "__main__":
    main()"#;
