async fn see(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SeeResponse>, HttpApiError> {
    let now = now_ms();
    let mut api = state.inner.lock().await;
    let response = api.see(&player_id, now).map_err(HttpApiError::from_space)?;
    Ok(Json(response))
}

/// Runs a whole move sequence on the server clock, one step per
/// [`BOT_STEP_DELAY_MS`], publishing each committed step so watchers see the
/// walk instead of a teleport. The roster lock is released between steps.
///
/// The run itself is a detached task: a caller that hangs up mid-walk cannot
/// abandon the bot with its moving flag still set.
async fn move_bot(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, HttpApiError> {
    let started_at = now_ms();
    let moves = request.moves;

    let started = {
        let mut api = state.inner.lock().await;
        api.begin_move(&player_id, &moves, started_at)
            .map_err(HttpApiError::from_space)?
    };
    state.bus.publish(started, started_at);

    match tokio::spawn(run_move_sequence(state, player_id, moves)).await {
        Ok(result) => result.map(Json),
        Err(err) => {
            warn!(error = %err, "move sequence task failed");
            Err(HttpApiError::internal("move sequence aborted"))
        }
    }
}

async fn run_move_sequence(
    state: AppState,
    player_id: String,
    moves: Vec<Direction>,
) -> Result<MoveResponse, HttpApiError> {
    let mut completed = Vec::new();
    let mut failed_move = None;
    let mut failure = None;
    let mut remaining = Vec::new();
    let mut lost = None;

    for (index, direction) in moves.iter().copied().enumerate() {
        tokio::time::sleep(Duration::from_millis(BOT_STEP_DELAY_MS)).await;

        let now = now_ms();
        let stepped = {
            let mut api = state.inner.lock().await;
            api.step_bot(&player_id, direction, now)
        };

        match stepped {
            Ok((StepOutcome::Committed, record)) => {
                completed.push(direction);
                state.bus.publish(record, now);
            }
            Ok((outcome, record)) => {
                failed_move = Some(direction);
                failure = outcome.rejection();
                remaining = moves[index + 1..].to_vec();
                state.bus.publish(record, now);
                break;
            }
            // Deleted while the sequence was in flight; still run the
            // end-of-move cleanup below before reporting it.
            Err(err) => {
                lost = Some(err);
                break;
            }
        }
    }

    let ended_at = now_ms();
    let finished = {
        let mut api = state.inner.lock().await;
        let finished = api.end_move(&player_id);
        forward_persistence_warning(&state, &api);
        finished
    };
    if let Some(err) = lost {
        return Err(HttpApiError::from_space(err));
    }
    let Some(record) = finished else {
        return Err(HttpApiError::not_found(&player_id));
    };
    state.bus.publish(record.clone(), ended_at);

    Ok(MoveResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        player_id,
        success: failed_move.is_none(),
        position: record.position,
        completed_moves: completed,
        failed_move,
        failure,
        remaining_moves: remaining,
    })
}

async fn send_message(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, HttpApiError> {
    let now = now_ms();
    let routed = {
        let mut api = state.inner.lock().await;
        let routed = api
            .send_bot_message(
                &player_id,
                &request.text,
                request.target_user_id.as_deref(),
                now,
            )
            .map_err(HttpApiError::from_space)?;
        forward_persistence_warning(&state, &api);
        routed
    };

    state.bus.chat(routed.message.clone());
    state
        .notifier
        .dispatch(routed.webhook_targets, &routed.message);

    Ok(Json(SendResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        message: routed.message,
    }))
}
