async fn enter_bot(
    State(state): State<AppState>,
    Json(request): Json<EnterRequest>,
) -> Result<Json<PlayerResponse>, HttpApiError> {
    let now = now_ms();
    let (record, joined) = {
        let mut api = state.inner.lock().await;
        let entered = api
            .enter_bot(request, now)
            .map_err(HttpApiError::from_space)?;
        forward_persistence_warning(&state, &api);
        entered
    };

    info!(
        player_id = record.player_id.as_str(),
        position = %record.position,
        "bot entered the plaza"
    );
    state.bus.publish(record.clone(), now);
    state.bus.chat(joined);

    Ok(Json(PlayerResponse::new(record)))
}

async fn update_bot(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<UpdateBotRequest>,
) -> Result<Json<PlayerResponse>, HttpApiError> {
    let now = now_ms();
    let record = {
        let mut api = state.inner.lock().await;
        let updated = api
            .update_bot(&player_id, request, now)
            .map_err(HttpApiError::from_space)?;
        forward_persistence_warning(&state, &api);
        updated
    };

    state.bus.publish(record.clone(), now);

    Ok(Json(PlayerResponse::new(record)))
}

async fn delete_bot(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteBotResponse>, HttpApiError> {
    let now = now_ms();
    let left = {
        let mut api = state.inner.lock().await;
        let left = api
            .delete_bot(&player_id, now)
            .map_err(HttpApiError::from_space)?;
        forward_persistence_warning(&state, &api);
        left
    };

    info!(player_id = player_id.as_str(), "bot left the plaza");
    state.bus.remove(&player_id, now);
    state.bus.chat(left);

    Ok(Json(DeleteBotResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        player_id,
        success: true,
    }))
}
